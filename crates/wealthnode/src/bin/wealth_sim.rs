// wealthnode/src/bin/wealth_sim.rs
// Scenario driver: every participant submits over its own framed session,
// then the first listed participant asks the host for the richest of the
// compare list. Amounts are encrypted client-side; the host only ever sees
// ciphertexts.

use std::{fs, path::PathBuf};

use anyhow::{anyhow, bail, Result};
use clap::Parser;
use rand::rngs::OsRng;
use serde::Deserialize;
use tracing::info;
use tracing_subscriber::EnvFilter;
use wealthalgo::dev_oracle::DevCoprocessor;
use wealthcrypto::{encrypt_amount, hash_key, keygen, load_json, PaillierPrivateKey, PaillierPublicKey};
use wealthnode::{derive_address, exchange, Call, Host, Reply};
use wealthregistry::{Address, Caller, ComparisonRegistry, RegistryConfig};

#[derive(Debug, Parser)]
struct Opt {
    /// Scenario JSON: { "participants":[{"name":..,"amount":..}, ...], "compare":[names] }
    #[arg(long)]
    scenario: PathBuf,

    /// Optional simulation config: { "registry": {..}, "key_bits": 2048 }
    #[arg(long)]
    config: Option<PathBuf>,

    /// Optional: load the Paillier public key from file instead of generating
    #[arg(long)]
    paillier_pub: Option<String>,

    /// Optional: load the Paillier private key from file instead of generating
    #[arg(long)]
    paillier_priv: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct SimConfig {
    registry: RegistryConfig,
    key_bits: u32,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            registry: RegistryConfig::default(),
            key_bits: 2048,
        }
    }
}

#[derive(Debug, Deserialize)]
struct Participant {
    name: String,
    amount: u64,
}

#[derive(Debug, Deserialize)]
struct Scenario {
    participants: Vec<Participant>,
    /// Names to compare, in order. Defaults to every participant.
    #[serde(default)]
    compare: Option<Vec<String>>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    let opt = Opt::parse();

    let config: SimConfig = match &opt.config {
        Some(path) => serde_json::from_slice(
            &fs::read(path).map_err(|e| anyhow!("failed to read config {path:?}: {e}"))?,
        )?,
        None => SimConfig::default(),
    };
    config.registry.validate()?;

    let scenario: Scenario = serde_json::from_slice(
        &fs::read(&opt.scenario).map_err(|e| anyhow!("failed to read scenario {:?}: {e}", opt.scenario))?,
    )?;
    if scenario.participants.is_empty() {
        bail!("scenario has no participants");
    }

    let (pk, sk): (PaillierPublicKey, PaillierPrivateKey) =
        match (&opt.paillier_pub, &opt.paillier_priv) {
            (Some(pub_path), Some(priv_path)) => (load_json(pub_path)?, load_json(priv_path)?),
            (None, None) => keygen(config.key_bits, &mut OsRng)?,
            _ => bail!("provide both --paillier-pub and --paillier-priv, or neither to generate keys"),
        };
    if sk.public_key() != pk {
        bail!("private key does not match public key");
    }
    info!(fingerprint = %hash_key(&pk), bits = pk.bits(), "registry key ready");

    let registry = ComparisonRegistry::new(pk.clone(), config.registry);
    let mut host = Host::new(registry, DevCoprocessor::new(sk));

    let lookup = |name: &str| -> Result<Address> {
        scenario
            .participants
            .iter()
            .find(|p| p.name == name)
            .map(|p| derive_address(&p.name))
            .ok_or_else(|| anyhow!("unknown participant {name:?}"))
    };

    for p in &scenario.participants {
        let who = derive_address(&p.name);
        let ciphertext = encrypt_amount(&pk, p.amount, &mut OsRng);
        let replies = exchange(&mut host, Caller::authenticated(who), vec![Call::Submit { ciphertext }])?;
        match replies.as_slice() {
            [Reply::Submitted] => info!(name = %p.name, address = %who, "submitted"),
            [Reply::Rejected(why)] => bail!("{} could not submit: {why}", p.name),
            other => bail!("unexpected reply to submit: {other:?}"),
        }
    }

    let candidates = match &scenario.compare {
        Some(names) => names.iter().map(|n| lookup(n)).collect::<Result<Vec<_>>>()?,
        None => scenario.participants.iter().map(|p| derive_address(&p.name)).collect(),
    };

    let asker = derive_address(&scenario.participants[0].name);
    let replies = exchange(
        &mut host,
        Caller::authenticated(asker),
        vec![Call::FindRichest { candidates }],
    )?;
    let winner = match replies.as_slice() {
        [Reply::Winner(w)] => *w,
        [Reply::Rejected(why)] => bail!("comparison rejected: {why}"),
        other => bail!("unexpected reply to find_richest: {other:?}"),
    };

    let name = scenario
        .participants
        .iter()
        .find(|p| derive_address(&p.name) == winner)
        .map(|p| p.name.as_str())
        .ok_or_else(|| anyhow!("winner {winner} is not a scenario participant"))?;
    info!(
        comparisons = host.coprocessor().comparisons(),
        disclosures = host.coprocessor().disclosures(),
        "scenario complete"
    );
    println!("richest: {name} ({winner})");
    Ok(())
}
