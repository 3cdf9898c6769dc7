//! Runtime configuration for the escrow service and the `escrowd` binary.

use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_DECISION_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_DECISION_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";
pub const DEFAULT_STRIPE_ENDPOINT: &str = "https://api.stripe.com";
/// Low temperature keeps release verdicts close to deterministic.
pub const DEFAULT_DECISION_TEMPERATURE: f32 = 0.3;

/// Engine-level settings of the escrow service.
#[derive(Debug, Clone)]
pub struct EscrowConfig {
    /// Upper bound on a single decision backend call.
    pub decision_timeout: Duration,
    /// How many recent order messages feed the decision engine.
    pub message_limit: usize,
    /// Reputation points granted to the seller on release.
    pub reputation_delta: i64,
}

impl Default for EscrowConfig {
    fn default() -> Self {
        Self {
            decision_timeout: Duration::from_secs(10),
            message_limit: 10,
            reputation_delta: 1,
        }
    }
}

/// Settings of the OpenAI-compatible decision backend.
#[derive(Debug, Clone)]
pub struct DecisionBackendConfig {
    pub endpoint: String,
    pub api_key: String,
    pub model: String,
    pub temperature: f32,
}

/// Settings of the Stripe-compatible payment gateway.
#[derive(Debug, Clone)]
pub struct StripeConfig {
    pub endpoint: String,
    pub secret_key: String,
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Applies escrow commands to a set of orders", long_about = None)]
pub struct Cli {
    /// JSON seed file with the orders (and optionally their messages)
    pub seed: PathBuf,

    /// CSV file of escrow commands (command, order, actor, role, amount, currency, force, reason)
    pub commands: PathBuf,

    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long)]
    pub db_path: Option<PathBuf>,

    /// API key of the decision backend. Without it the fallback heuristics decide.
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub openai_api_key: Option<String>,

    /// Chat completions endpoint of the decision backend
    #[arg(long, default_value = DEFAULT_DECISION_ENDPOINT)]
    pub decision_endpoint: String,

    /// Model used for release decisions
    #[arg(long, default_value = DEFAULT_DECISION_MODEL)]
    pub decision_model: String,

    /// Timeout of a single decision backend call, in seconds
    #[arg(long, default_value_t = 10)]
    pub decision_timeout_secs: u64,

    /// Number of recent order messages considered by the decision engine
    #[arg(long, default_value_t = 10)]
    pub message_limit: usize,

    /// Secret key of the payment processor. Without it an in-memory gateway is used.
    #[arg(long, env = "STRIPE_SECRET_KEY", hide_env_values = true)]
    pub stripe_secret_key: Option<String>,

    /// Base URL of the payment processor API
    #[arg(long, default_value = DEFAULT_STRIPE_ENDPOINT)]
    pub stripe_endpoint: String,

    /// Default log filter; `RUST_LOG` takes precedence
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Emit logs as JSON
    #[arg(long)]
    pub json_logs: bool,
}

impl Cli {
    pub fn escrow_config(&self) -> EscrowConfig {
        EscrowConfig {
            decision_timeout: Duration::from_secs(self.decision_timeout_secs),
            message_limit: self.message_limit,
            ..EscrowConfig::default()
        }
    }

    pub fn decision_backend(&self) -> Option<DecisionBackendConfig> {
        let api_key = self.openai_api_key.as_deref()?.trim();
        if api_key.is_empty() {
            return None;
        }
        Some(DecisionBackendConfig {
            endpoint: self.decision_endpoint.clone(),
            api_key: api_key.to_string(),
            model: self.decision_model.clone(),
            temperature: DEFAULT_DECISION_TEMPERATURE,
        })
    }

    pub fn stripe(&self) -> Option<StripeConfig> {
        let secret_key = self.stripe_secret_key.as_deref()?.trim();
        if secret_key.is_empty() {
            return None;
        }
        Some(StripeConfig {
            endpoint: self.stripe_endpoint.clone(),
            secret_key: secret_key.to_string(),
        })
    }
}
