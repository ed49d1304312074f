use anyhow::{bail, Context, Result};
use clap::Parser;
use kryptor_core::{BatchDriver, DecryptKeyMode, EncryptKeyMode, FileOrchestrator, Options};
use std::path::PathBuf;
use zeroize::Zeroizing;

/// kryptor: chunked authenticated file and directory encryption.
///
/// This binary is a thin flag dispatcher; all cryptographic work happens in
/// `kryptor-core`. It resolves key material from flags/environment, builds
/// the appropriate key mode, and forwards to a `BatchDriver`.
#[derive(Parser, Debug)]
#[command(author, version, about = "Encrypt and decrypt files with authenticated chunked encryption")]
struct Cli {
    /// Encrypt the given paths.
    #[arg(long, conflicts_with = "decrypt")]
    encrypt: bool,

    /// Decrypt the given paths.
    #[arg(long, conflicts_with = "encrypt")]
    decrypt: bool,

    /// Password for password-mode encryption/decryption.
    #[arg(long)]
    password: Option<String>,

    /// Path to a 32-byte raw symmetric keyfile.
    #[arg(long)]
    key: Option<PathBuf>,

    /// Path to a 32-byte raw X25519 private keyfile (sender on encrypt,
    /// recipient on decrypt).
    #[arg(long)]
    private: Option<PathBuf>,

    /// Path to a 32-byte raw X25519 public keyfile (recipient on encrypt,
    /// sender on decrypt). May be repeated; only the first is used today.
    #[arg(long)]
    public: Vec<PathBuf>,

    /// Optional 32-byte pre-shared key mixed into asymmetric key derivation.
    #[arg(long = "pre-shared-key")]
    pre_shared_key: Option<PathBuf>,

    /// Hide original file names in the output (encrypt only).
    #[arg(long)]
    names: bool,

    /// Delete the input file(s) after a fully successful operation.
    #[arg(long)]
    overwrite: bool,

    /// Files or directories to process.
    #[arg(required = true)]
    paths: Vec<PathBuf>,
}

fn read_key32(path: &PathBuf) -> Result<Zeroizing<[u8; 32]>> {
    let bytes = std::fs::read(path).with_context(|| format!("reading key file {}", path.display()))?;
    if bytes.len() != 32 {
        bail!("{} must contain exactly 32 bytes, found {}", path.display(), bytes.len());
    }
    let mut out = [0u8; 32];
    out.copy_from_slice(&bytes);
    Ok(Zeroizing::new(out))
}

fn read_pre_shared_key(path: &Option<PathBuf>) -> Result<Option<[u8; 32]>> {
    match path {
        Some(p) => Ok(Some(*read_key32(p)?)),
        None => Ok(None),
    }
}

fn build_encrypt_mode(cli: &Cli) -> Result<EncryptKeyMode> {
    let pre_shared_key = read_pre_shared_key(&cli.pre_shared_key)?;
    if let Some(password) = &cli.password {
        return Ok(EncryptKeyMode::Password { password: Zeroizing::new(password.clone().into_bytes()), pre_shared_key });
    }
    if let Some(key_path) = &cli.key {
        return Ok(EncryptKeyMode::SymmetricKey(read_key32(key_path)?));
    }
    if let Some(private_path) = &cli.private {
        let sender_sk = read_key32(private_path)?;
        if let Some(public_path) = cli.public.first() {
            let recipient_pk = *read_key32(public_path)?;
            return Ok(EncryptKeyMode::Asymmetric { sender_sk, recipient_pk, pre_shared_key });
        }
        return Ok(EncryptKeyMode::self_encrypt(sender_sk, pre_shared_key));
    }
    bail!("one of --password, --key, or --private must be given for --encrypt");
}

fn build_decrypt_mode(cli: &Cli) -> Result<DecryptKeyMode> {
    let pre_shared_key = read_pre_shared_key(&cli.pre_shared_key)?;
    if let Some(password) = &cli.password {
        return Ok(DecryptKeyMode::Password { password: Zeroizing::new(password.clone().into_bytes()), pre_shared_key });
    }
    if let Some(key_path) = &cli.key {
        return Ok(DecryptKeyMode::SymmetricKey(read_key32(key_path)?));
    }
    if let Some(private_path) = &cli.private {
        let recipient_sk = read_key32(private_path)?;
        if let Some(public_path) = cli.public.first() {
            let sender_pk = *read_key32(public_path)?;
            return Ok(DecryptKeyMode::Asymmetric { recipient_sk, sender_pk, pre_shared_key });
        }
        return Ok(DecryptKeyMode::self_decrypt(recipient_sk, pre_shared_key));
    }
    bail!("one of --password, --key, or --private must be given for --decrypt");
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    if let Err(e) = kryptor_core::security::disable_core_dumps() {
        tracing::warn!(error = %e, "failed to disable core dumps");
    }

    let cli = Cli::parse();
    if !cli.encrypt && !cli.decrypt {
        bail!("one of --encrypt or --decrypt must be given");
    }

    let opts = Options { overwrite_input: cli.overwrite, encrypt_file_names: cli.names };
    let driver = BatchDriver::new(FileOrchestrator::default());

    let exit_code = if cli.encrypt {
        let mode = build_encrypt_mode(&cli)?;
        let mut rng = rand::rngs::OsRng;
        let (stats, results) = driver.encrypt_all(&cli.paths, &mode, &opts, &mut rng).await;
        report(&results);
        stats.exit_code()
    } else {
        let mode = build_decrypt_mode(&cli)?;
        let (stats, results) = driver.decrypt_all(&cli.paths, &mode, &opts).await;
        report(&results);
        stats.exit_code()
    };

    std::process::exit(exit_code);
}

fn report(results: &[kryptor_core::FileResult]) {
    for result in results {
        match &result.outcome {
            Ok(output) => println!("{} -> {}", result.input_path.display(), output.display()),
            Err(e) => eprintln!("{}: {}", result.input_path.display(), e.user_message()),
        }
    }
}
