pub mod js_bridge;
pub mod page_driver;

pub use js_bridge::{BridgeResponse, JsBridge, BRIDGE_ENTRY};
pub use page_driver::{BrowserHost, PageHandle, SharedSpace};
