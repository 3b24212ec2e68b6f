//! Basic usage example for `FieldSeal`.

use fieldseal::prelude::*;
use fieldseal_key_file::FileKeyProvider;
use std::path::PathBuf;

fn to_json(record: &Record) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(&Value::Object(record.clone()).into_json())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("FieldSeal Basic Usage Example");
    println!("=============================\n");

    let key_dir = PathBuf::from("./example_keys");
    if !key_dir.exists() {
        println!("Initializing key directory at {}...", key_dir.display());
        FileKeyProvider::init(&key_dir)?;
        println!("✓ Key directory initialized\n");
    }

    // Every provider key yields up to 100 data keys.
    let provider = KeyAmortizer::new(FileKeyProvider::new(&key_dir)?, AmortizerConfig::new(100))?;
    let config = VaultConfig { max_uses_per_data_key: 1, provider_timeout_ms: Some(5_000) };
    let vault = Vault::with_config(provider, XChaChaCipher, config)?;
    println!("✓ Vault created with XChaCha20-Poly1305\n");

    let account = Record::from([
        ("pk".to_string(), Value::from("account-123")),
        ("sk".to_string(), Value::from("Flava Flav")),
        ("accountNumber".to_string(), Value::from("123")),
        ("balance".to_string(), Value::from(100)),
    ]);
    let fields = FieldSelection::new(["accountNumber", "balance"])?;
    println!("Plaintext record:\n{}\n", to_json(&account)?);

    let encrypted = vault.encrypt_item(account.clone(), &fields).await?;
    println!("✓ Encrypted record:\n{}\n", to_json(&encrypted)?);

    let decrypted = vault.decrypt_item(encrypted).await?;
    assert_eq!(decrypted, account);
    println!("✓ Round-trip verification successful\n");

    let items = (0..3)
        .map(|n| {
            let mut record = account.clone();
            record.insert("pk".to_string(), Value::from(format!("account-{n}")));
            ItemToEncrypt::new(record, fields.clone())
        })
        .collect();
    let batch = vault.encrypt_items(items).await?;
    let restored = vault.decrypt_items(batch).await?;
    println!("✓ Batch of {} records encrypted and decrypted\n", restored.len());

    println!("=============================");
    println!("All operations successful!");
    println!("\nNote: Key directory at {} can be deleted manually", key_dir.display());

    Ok(())
}
