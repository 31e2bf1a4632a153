use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;
use wealthcrypto::{hash_key, keygen, save_json};

#[derive(Parser, Debug)]
struct Opt {
    /// Output directory
    #[arg(long, default_value = "./keys")]
    out: String,
    /// Key size in bits
    #[arg(long, default_value_t = 2048)]
    bits: u32,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    let opt = Opt::parse();
    std::fs::create_dir_all(&opt.out)?;
    let (pk, sk) = keygen(opt.bits, &mut rand::rngs::OsRng)?;
    save_json(&format!("{}/paillier_pub.json", opt.out), &pk)?;
    save_json(&format!("{}/paillier_priv.json", opt.out), &sk)?;
    info!(out = %opt.out, bits = opt.bits, fingerprint = %hash_key(&pk), "wrote Paillier keys");
    Ok(())
}
