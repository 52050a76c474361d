//! Browser evidence capture for Vantage audits.
//!
//! Drives Chromium (launched locally or attached over CDP) to take full-page
//! screenshots, extract page text and run accessibility checks, under the
//! process-wide browser-session limit.

pub mod actions;
pub mod axe;
pub mod capture;
pub mod engine;
pub mod error;
pub mod profile;
pub mod scripts;

pub use actions::{BrowserSession, CapturePage, SessionKind, SessionProvider};
pub use axe::AxeRunner;
pub use capture::{CaptureRequest, CaptureSettings, EvidenceCapturer};
pub use engine::ChromiumSessionProvider;
pub use error::{BrowserError, Result};
pub use profile::DeviceProfile;
