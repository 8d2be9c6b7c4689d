//! Doctor service - ledger health checks

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use serde_json::json;

use crate::adapters::duckdb::DuckDbRepository;
use crate::domain::result::Result;
use crate::ports::Repository;

/// Doctor service for health checks
pub struct DoctorService<R: Repository = DuckDbRepository> {
    repository: Arc<R>,
}

impl<R: Repository> DoctorService<R> {
    pub fn new(repository: Arc<R>) -> Self {
        Self { repository }
    }

    /// Run all health checks
    pub fn run_checks(&self) -> Result<DoctorResult> {
        let mut checks = HashMap::new();

        // Every stored balance must equal credits minus debits
        let mismatches = self.repository.read(|uow| uow.balance_mismatches())?;
        let mismatch_details: Vec<serde_json::Value> = mismatches
            .iter()
            .map(|m| {
                json!({
                    "account_id": m.account_id,
                    "stored_balance": m.stored_balance.to_string(),
                    "ledger_balance": m.ledger_balance.to_string(),
                })
            })
            .collect();
        checks.insert(
            "balance_reconciliation".to_string(),
            CheckResult::from_findings(
                mismatch_details,
                "error",
                "All balances match the ledger".to_string(),
                |n| format!("{} account(s) disagree with their ledger entries", n),
            ),
        );

        let orphaned = self.repository.read(|uow| uow.orphaned_transactions())?;
        checks.insert(
            "orphaned_entries".to_string(),
            CheckResult::from_findings(
                orphaned.iter().map(|id| json!({ "transaction_id": id })).collect(),
                "error",
                "No orphaned ledger entries found".to_string(),
                |n| format!("{} ledger entry(s) reference missing accounts", n),
            ),
        );

        let malformed = self.repository.read(|uow| uow.malformed_transactions())?;
        checks.insert(
            "malformed_entries".to_string(),
            CheckResult::from_findings(
                malformed.iter().map(|id| json!({ "transaction_id": id })).collect(),
                "warning",
                "All ledger entries match their kind".to_string(),
                |n| format!("{} ledger entry(s) have references that do not fit their kind", n),
            ),
        );

        let passed = checks.values().filter(|c| c.status == "pass").count() as i64;
        let warnings = checks.values().filter(|c| c.status == "warning").count() as i64;
        let errors = checks.values().filter(|c| c.status == "error").count() as i64;

        Ok(DoctorResult {
            checks,
            summary: DoctorSummary { passed, warnings, errors },
        })
    }
}

#[derive(Debug, Serialize)]
pub struct DoctorResult {
    pub checks: HashMap<String, CheckResult>,
    pub summary: DoctorSummary,
}

impl DoctorResult {
    pub fn is_healthy(&self) -> bool {
        self.summary.errors == 0 && self.summary.warnings == 0
    }
}

#[derive(Debug, Serialize)]
pub struct CheckResult {
    pub status: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<serde_json::Value>>,
}

impl CheckResult {
    fn from_findings(
        findings: Vec<serde_json::Value>,
        failing_status: &str,
        pass_message: String,
        fail_message: impl Fn(usize) -> String,
    ) -> Self {
        if findings.is_empty() {
            return Self {
                status: "pass".to_string(),
                message: pass_message,
                details: None,
            };
        }
        Self {
            status: failing_status.to_string(),
            message: fail_message(findings.len()),
            details: Some(findings),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DoctorSummary {
    pub passed: i64,
    pub warnings: i64,
    pub errors: i64,
}
