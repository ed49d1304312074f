//! Statistical and determinism properties from spec.md S8 that don't fit
//! naturally as a single concrete scenario.

use kryptor_core::{EncryptKeyMode, FileOrchestrator, Options};
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use std::collections::HashSet;
use zeroize::Zeroizing;

#[tokio::test]
async fn same_seed_and_input_produce_byte_identical_ciphertext() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("a.txt");
    std::fs::write(&input, b"deterministic payload").unwrap();

    let orchestrator = FileOrchestrator::default();
    let mode = EncryptKeyMode::SymmetricKey(Zeroizing::new([0x10u8; 32]));
    let opts = Options { overwrite_input: false, encrypt_file_names: false };

    let mut rng_a = ChaCha20Rng::seed_from_u64(42);
    let out_a = orchestrator.encrypt_file(&input, &mode, &opts, &mut rng_a).await.unwrap();
    let bytes_a = std::fs::read(&out_a).unwrap();
    std::fs::remove_file(&out_a).unwrap();

    let mut rng_b = ChaCha20Rng::seed_from_u64(42);
    let out_b = orchestrator.encrypt_file(&input, &mode, &opts, &mut rng_b).await.unwrap();
    let bytes_b = std::fs::read(&out_b).unwrap();

    assert_eq!(bytes_a, bytes_b, "identical seed and input must yield identical ciphertext");
}

#[tokio::test]
async fn header_nonces_are_not_repeated_across_many_encryptions() {
    const MAGIC_LEN: usize = 4;
    const FORMAT_VERSION_LEN: usize = 2;
    const EPK_LEN: usize = 32;
    const NONCE_LEN: usize = 24;
    const NONCE_OFFSET: usize = MAGIC_LEN + FORMAT_VERSION_LEN + EPK_LEN;

    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("a.txt");
    std::fs::write(&input, b"x").unwrap();

    let orchestrator = FileOrchestrator::default();
    let mode = EncryptKeyMode::SymmetricKey(Zeroizing::new([0x20u8; 32]));
    let opts = Options { overwrite_input: false, encrypt_file_names: false };
    let mut rng = rand::rngs::OsRng;

    let mut seen = HashSet::new();
    for _ in 0..10_000 {
        let out = orchestrator.encrypt_file(&input, &mode, &opts, &mut rng).await.unwrap();
        let bytes = std::fs::read(&out).unwrap();
        let nonce = bytes[NONCE_OFFSET..NONCE_OFFSET + NONCE_LEN].to_vec();
        assert!(seen.insert(nonce), "header_nonce repeated within {} samples", seen.len());
        std::fs::remove_file(out).unwrap();
    }
}
