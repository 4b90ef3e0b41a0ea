//! `codegate credential` — local OS keychain utilities for the secrets a
//! `CredentialRecord.secret_ref` points at (§4.C). These commands talk to
//! the keyring directly; they don't go through the running gateway, so
//! they work even when the server isn't up.

const SERVICE: &str = "codegate";

pub fn set(secret_ref: &str) -> anyhow::Result<()> {
    eprint!("Secret value for {secret_ref}: ");
    use std::io::Write;
    std::io::stderr().flush().ok();
    let mut value = String::new();
    std::io::stdin().read_line(&mut value)?;
    let value = value.trim();
    if value.is_empty() {
        anyhow::bail!("secret value must not be empty");
    }
    let entry = keyring::Entry::new(SERVICE, secret_ref)?;
    entry.set_password(value)?;
    println!("Stored secret for {secret_ref}");
    Ok(())
}

pub fn get(secret_ref: &str) -> anyhow::Result<()> {
    let entry = keyring::Entry::new(SERVICE, secret_ref)?;
    match entry.get_password() {
        Ok(value) => println!("{secret_ref}: {}", mask(&value)),
        Err(keyring::Error::NoEntry) => println!("{secret_ref}: (not set)"),
        Err(e) => return Err(e.into()),
    }
    Ok(())
}

pub fn delete(secret_ref: &str) -> anyhow::Result<()> {
    let entry = keyring::Entry::new(SERVICE, secret_ref)?;
    match entry.delete_credential() {
        Ok(()) => println!("Deleted secret for {secret_ref}"),
        Err(keyring::Error::NoEntry) => println!("{secret_ref}: (not set)"),
        Err(e) => return Err(e.into()),
    }
    Ok(())
}

fn mask(value: &str) -> String {
    if value.len() <= 8 {
        "***".to_string()
    } else {
        format!("{}...{}", &value[..4], &value[value.len() - 4..])
    }
}
