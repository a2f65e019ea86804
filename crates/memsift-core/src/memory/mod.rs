mod cursor;
mod scan;
mod store;

pub use cursor::Cursor;
pub use scan::ScanConfig;
pub use store::RegionStore;
