use anyhow::bail;
use clap::Parser;
use rug::Integer;
use tracing::info;
use tracing_subscriber::EnvFilter;
use wealthcrypto::{dec, enc, hash_key, load_json, PaillierPrivateKey, PaillierPublicKey};

#[derive(Parser, Debug)]
struct Opt {
    #[arg(long)]
    paillier_pub: String,
    #[arg(long)]
    paillier_priv: Option<String>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    let opt = Opt::parse();
    let pk: PaillierPublicKey = load_json(&opt.paillier_pub)?;
    println!("Public key hash: {}", hash_key(&pk));
    info!(bits = pk.bits(), "public key loaded");
    if let Some(sk_path) = &opt.paillier_priv {
        let sk: PaillierPrivateKey = load_json(sk_path)?;
        if sk.public_key() != pk {
            bail!("private key {sk_path} does not belong to {}", opt.paillier_pub);
        }
        // enc/dec probe
        let probe = Integer::from(0x5eed_u32);
        let c = enc(&pk, &probe, &mut rand::rngs::OsRng);
        if dec(&sk, &c) != probe {
            bail!("private key {sk_path} fails the decryption probe");
        }
        println!("Private key matches and decrypts.");
    }
    Ok(())
}
