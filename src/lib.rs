// OTC desk client library: wallet session, contract proxies, readers,
// action dispatch and the terminal view model

pub mod config;
pub mod contracts;
pub mod desk;
pub mod dispatcher;
pub mod error;
pub mod readers;
pub mod storage;
pub mod types;
pub mod ui;
pub mod view;
pub mod wallet;

pub use config::Config;
pub use desk::{DeskSnapshot, NoticeLevel, OtcDesk};
pub use dispatcher::{Action, ActionReport, RefreshScope};
pub use error::{OtcError, OtcResult};
pub use types::*;
