pub mod db;
pub mod io;

pub use db::AuditStore;
