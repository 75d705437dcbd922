use anyhow::{Result, bail};
use serde::Serialize;

use nutrifit_core::db::Database;

#[derive(Debug, Serialize, PartialEq, Eq)]
pub(crate) struct AccountStatus {
    pub id: i64,
    pub email: String,
    pub active: bool,
}

/// Inactive accounts cannot log in, refresh tokens or use existing access tokens.
pub(crate) fn set_account_active(
    db: &Database,
    email: &str,
    active: bool,
) -> Result<AccountStatus> {
    let Some(credentials) = db.get_user_credentials(email)? else {
        bail!("No user with email '{email}'");
    };
    let user = credentials.user;
    db.set_user_active(user.id, active)?;
    tracing::info!(user_id = user.id, active, "account status changed");
    Ok(AccountStatus {
        id: user.id,
        email: user.email,
        active,
    })
}

pub(crate) fn cmd_user_active(
    db: &Database,
    email: &str,
    active: bool,
    json: bool,
) -> Result<()> {
    let status = set_account_active(db, email, active)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        let verb = if active { "Activated" } else { "Deactivated" };
        println!("{verb} {} (id {})", status.email, status.id);
    }

    Ok(())
}
