pub mod browser;
pub mod cdp;
pub mod miclub;
pub mod text;

pub use browser::{find_browser_binary, BrowserEngine, BrowserSession};
pub use cdp::CdpClient;
pub use miclub::{ChromePortalFactory, MiclubPortal};
