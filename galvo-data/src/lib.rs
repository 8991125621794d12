pub mod config;
pub mod grid;
pub mod variant;

pub use config::{AxisSweep, ScanConfig, SweepPattern};
pub use grid::PixelGrid;
pub use variant::ProtocolVariant;
