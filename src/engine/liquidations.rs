//! Liquidation detection and margin reporting.
//!
//! Neither operation takes account locks. Each account is evaluated from one
//! load and one price snapshot, so its equity and requirement agree with each
//! other, but an account may trade between its evaluation and the record being
//! appended. The trade-time check is the hard gate; this is monitoring.

use super::core::Engine;
use super::results::{
    AccountMarginStatus, EngineError, LiquidationCandidate, LiquidationScan, MarginReport, SkippedAccount,
};
use crate::history::{HistoryLog, LiquidationRecord};
use crate::margin::MarginFigures;
use crate::store::StateStore;
use crate::types::{AccountId, Quote, Timestamp};

pub fn liquidation_reason(equity: Quote, maintenance_margin: Quote) -> String {
    format!(
        "Equity ({}) below maintenance margin ({}), shortfall {}",
        equity,
        maintenance_margin,
        maintenance_margin.saturating_sub(equity)
    )
}

impl<S: StateStore, H: HistoryLog> Engine<S, H> {
    /// Flag every account with `equity < maintenance margin` and append one
    /// liquidation record per flagged account. Repeated scans of a still-breaching
    /// account append again. Positions are never touched.
    pub fn scan_for_liquidations(&self) -> Result<LiquidationScan, EngineError> {
        let (evaluated, skipped) = self.evaluate_all()?;
        let mut candidates = Vec::new();

        for (account_id, figures) in evaluated {
            if !figures.is_liquidation_candidate() {
                continue;
            }

            let reason = liquidation_reason(figures.equity, figures.maintenance_margin);
            let record = LiquidationRecord {
                account_id,
                equity: figures.equity,
                maintenance_margin: figures.maintenance_margin,
                reason: reason.clone(),
                timestamp: Timestamp::now(),
            };

            let record_id = match self.history.append_liquidation(record) {
                Ok(id) => Some(id),
                Err(err) => {
                    tracing::warn!(account_id = %account_id, error = %err, "liquidation detected but not recorded");
                    None
                }
            };

            tracing::info!(
                account_id = %account_id,
                equity = %figures.equity,
                maintenance_margin = %figures.maintenance_margin,
                "liquidation candidate"
            );

            candidates.push(LiquidationCandidate {
                account_id,
                equity: figures.equity,
                maintenance_margin: figures.maintenance_margin,
                shortfall: figures.maintenance_margin.saturating_sub(figures.equity),
                reason,
                record_id,
            });
        }

        Ok(LiquidationScan { candidates, skipped })
    }

    /// Margin figures for every account. Read only: appends nothing.
    pub fn margin_report(&self) -> Result<MarginReport, EngineError> {
        let (evaluated, skipped) = self.evaluate_all()?;

        let accounts: Vec<AccountMarginStatus> = evaluated
            .into_iter()
            .map(|(account_id, figures)| AccountMarginStatus {
                account_id,
                equity: figures.equity,
                used_margin: figures.used_margin,
                maintenance_margin: figures.maintenance_margin,
                free_margin: figures.free_margin,
                margin_utilisation_pct: figures.utilisation_pct(),
                status: figures.status(),
                is_liquidation_candidate: figures.is_liquidation_candidate(),
            })
            .collect();

        let liquidation_candidates = accounts
            .iter()
            .filter(|status| status.is_liquidation_candidate)
            .map(|status| status.account_id)
            .collect();

        Ok(MarginReport {
            total_accounts: accounts.len() + skipped.len(),
            accounts,
            liquidation_candidates,
            skipped,
        })
    }

    // listing accounts is the only failure that aborts; per-account failures are skipped
    fn evaluate_all(&self) -> Result<(Vec<(AccountId, MarginFigures)>, Vec<SkippedAccount>), EngineError> {
        let mut evaluated = Vec::new();
        let mut skipped = Vec::new();

        for account_id in self.store.account_ids()? {
            let result = self
                .store
                .load_account(account_id)
                .map_err(EngineError::from)
                .and_then(|account| match account {
                    Some(account) => self.evaluate(&account),
                    None => Err(EngineError::AccountNotFound(account_id)),
                });

            match result {
                Ok(figures) => evaluated.push((account_id, figures)),
                Err(err) => {
                    tracing::warn!(account_id = %account_id, error = %err, "account skipped");
                    skipped.push(SkippedAccount {
                        account_id,
                        reason: err.to_string(),
                    });
                }
            }
        }

        Ok((evaluated, skipped))
    }
}
