use anyhow::{anyhow, Result};
use claim_auth::ClaimOptions;
use claim_auth_local::{LocalProviderOptions, MIN_HASH_COST};
use claim_core::{ClaimConfig, ClaimConfigSnapshot, CollectionKind};

pub const ENV_PREFIX: &str = "CLAIM__";

/// Reservation seeded before the sign-in attempt.
pub struct DemoSeed {
    pub kind: CollectionKind,
    pub email: String,
    pub given_name: Option<String>,
    pub surname: Option<String>,
}

pub struct DemoConfig {
    pub options: ClaimOptions,
    pub local: LocalProviderOptions,
    pub seed: DemoSeed,
    /// Take the directory offline after seeding.
    pub store_offline: bool,
}

/// Read `CLAIM__*` variables into a config snapshot and build every option
/// set from it.
pub fn config() -> Result<DemoConfig> {
    let mut config = ClaimConfig::new();
    // fast hashing unless overridden
    config.set("local.hash_cost", MIN_HASH_COST.to_string());
    let loaded = config.load_env(ENV_PREFIX);
    tracing::debug!(loaded, "configuration loaded from environment");

    let snapshot = config.snapshot();
    let options = ClaimOptions::from_config(&snapshot).map_err(|e| anyhow!(e))?;
    let local = LocalProviderOptions::from_config(&snapshot)?;

    Ok(DemoConfig {
        options,
        local,
        seed: seed(&snapshot)?,
        store_offline: snapshot.get_bool("demo.store_offline").unwrap_or(false),
    })
}

fn seed(snapshot: &ClaimConfigSnapshot) -> Result<DemoSeed> {
    let kind = match snapshot.get("demo.kind").unwrap_or("staff") {
        "staff" => CollectionKind::Staff,
        "customer" => CollectionKind::Customer,
        other => return Err(anyhow!("demo.kind must be 'staff' or 'customer', got '{other}'")),
    };

    Ok(DemoSeed {
        kind,
        email: snapshot
            .get_string("demo.email")
            .unwrap_or_else(|| "jane@x.com".to_string()),
        given_name: Some(snapshot.get_string("demo.given_name").unwrap_or_else(|| "Jane".to_string())),
        surname: snapshot.get_string("demo.surname"),
    })
}
