pub mod binary_fetch;
pub mod browser;
pub mod extractor;
pub mod headless;
pub mod page_access;
pub mod remote_fetch;
pub mod storage;
