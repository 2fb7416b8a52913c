//! Advertisement filtering by complete local name

use tracing::{debug, info};

use crate::{
    core::error::{ClientError, ClientResult},
    stack::adv,
};

/// Longest name that fits in a legacy advertisement
pub const MAX_TARGET_NAME_LEN: usize = 31;

/// What to do with one advertising report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanDecision {
    /// Not the target, or a connect is already underway
    Ignore,
    /// First match since the scan started: stop scanning and connect
    Connect,
}

/// Matches advertisements against the target device name
///
/// Once a report matches, the filter latches and ignores every further
/// report until the next scan cycle re-arms it, so a burst of matching
/// reports produces exactly one connect.
#[derive(Debug, Default)]
pub struct ScanFilter {
    target: Option<Vec<u8>>,
    stopped: bool,
}

impl ScanFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and store the name to connect to
    pub fn set_target(&mut self, name: &str) -> ClientResult<()> {
        if name.is_empty() {
            return Err(ClientError::InvalidTargetName("name is empty".into()));
        }
        if name.len() > MAX_TARGET_NAME_LEN {
            return Err(ClientError::InvalidTargetName(format!(
                "{} bytes exceeds {MAX_TARGET_NAME_LEN}",
                name.len()
            )));
        }
        info!("Target device name set to {name:?}");
        self.target = Some(name.as_bytes().to_vec());
        Ok(())
    }

    pub fn target(&self) -> Option<&[u8]> {
        self.target.as_deref()
    }

    /// Whether a match already stopped the current scan
    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Start of a scan cycle
    pub fn rearm(&mut self) {
        self.stopped = false;
    }

    /// Decide on one advertising report
    pub fn evaluate(&mut self, adv_data: &[u8]) -> ScanDecision {
        let Some(name) = adv::complete_local_name(adv_data) else {
            return ScanDecision::Ignore;
        };
        debug!(name = %String::from_utf8_lossy(name), "Advertisement");

        // length and content must both agree; prefixes never match
        let Some(target) = self.target.as_deref() else {
            return ScanDecision::Ignore;
        };
        if name != target {
            return ScanDecision::Ignore;
        }

        if self.stopped {
            debug!("Target seen again while connecting, ignored");
            return ScanDecision::Ignore;
        }
        self.stopped = true;
        info!(name = %String::from_utf8_lossy(name), "Found target device");
        ScanDecision::Connect
    }
}
