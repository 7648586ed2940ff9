//! Threshold gate

use super::LedgerStatus;
use crate::account::AccountConfig;

/// Whether enough distinct authorized approvals were collected to execute.
///
/// Identities outside a non-empty approver set never count, even if a status
/// snapshot lists them.
pub fn can_execute(status: &LedgerStatus, config: &AccountConfig) -> bool {
    let counted = status
        .resolved_identities
        .iter()
        .filter(|identity| config.is_authorized(identity))
        .count();

    counted >= config.threshold.max(1)
}
