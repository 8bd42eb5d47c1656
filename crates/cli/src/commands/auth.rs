//! Account commands: login, register, logout, whoami.

use std::path::Path;

use redseam_client::api::{Avatar, RegisterForm};

use super::{CliError, Context};
use crate::output;

pub async fn login(ctx: &Context, email: &str, password: &str) -> Result<(), CliError> {
    let auth = ctx.api.login(email, password).await?;
    let session = ctx.session.establish(auth)?;

    tracing::info!(user_id = %session.user_id(), "Logged in");
    output::line(format_args!("Logged in as {}", session.display_name()));
    Ok(())
}

pub async fn register(
    ctx: &Context,
    username: String,
    email: String,
    password: String,
    avatar: Option<&Path>,
) -> Result<(), CliError> {
    let avatar = avatar.map(read_avatar).transpose()?;
    let form = RegisterForm {
        username,
        email,
        password_confirmation: password.clone(),
        password,
        avatar,
    };

    let auth = ctx.api.register(form).await?;
    let session = ctx.session.establish(auth)?;

    tracing::info!(user_id = %session.user_id(), "Account created");
    output::line(format_args!("Welcome, {}!", session.display_name()));
    Ok(())
}

pub fn logout(ctx: &Context) -> Result<(), CliError> {
    if ctx.session.current().is_none() {
        output::line("Not logged in.");
        return Ok(());
    }
    ctx.session.clear_session()?;
    output::line("Logged out.");
    Ok(())
}

pub fn whoami(ctx: &Context) -> Result<(), CliError> {
    let session = ctx.session.current().ok_or(CliError::NotLoggedIn)?;
    if ctx.json {
        output::json(&session.user)?;
    } else {
        output::session(&session);
    }
    Ok(())
}

fn read_avatar(path: &Path) -> Result<Avatar, CliError> {
    let bytes = std::fs::read(path).map_err(|source| CliError::ReadFile {
        path: path.display().to_string(),
        source,
    })?;

    let mime_type = match path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        _ => {
            return Err(CliError::InvalidArgument(format!(
                "{} is not a png, jpeg, webp or gif image",
                path.display()
            )));
        }
    };

    let file_name = path
        .file_name()
        .map_or_else(|| "avatar".to_string(), |name| name.to_string_lossy().into_owned());

    Ok(Avatar {
        file_name,
        mime_type: mime_type.to_string(),
        bytes,
    })
}
