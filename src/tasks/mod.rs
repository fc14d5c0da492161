//! Background tasks

mod maintenance;

pub use maintenance::{MaintenanceReport, MaintenanceTask};
