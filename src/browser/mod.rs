pub mod cdp_driver;
pub mod connection;
pub mod headless;

pub use cdp_driver::{CdpHost, CdpPage, CdpSpace};
pub use connection::connect_to_browser;
pub use headless::launch_headless_browser;
