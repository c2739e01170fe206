use anyhow::Result;
use colored::Colorize;
use copypasta::{ClipboardContext, ClipboardProvider};
use indicatif::{ProgressBar, ProgressStyle};
use llm_gateway::{
    config::load_config,
    oauth::{
        callback_server::start_callback_server, manager::OAuthManager, session_store::SessionStore,
        state_store::StateStore, token_store::{TokenKey, TokenStore},
    },
};
use std::sync::Arc;

/// This CLI drives a single local operator; tokens are keyed under this id
/// the same way the gateway's HTTP surface would key them per authenticated user.
const CLI_USER_ID: &str = "default";

fn try_copy_to_clipboard(url: &str) -> bool {
    ClipboardContext::new().and_then(|mut ctx| ctx.set_contents(url.to_owned())).is_ok()
}

async fn build_manager() -> Result<(Arc<OAuthManager>, Arc<TokenStore>)> {
    let config = load_config()?;
    let token_store = Arc::new(TokenStore::new(std::path::PathBuf::from("./data/oauth_tokens.json")).await?);
    let manager = Arc::new(OAuthManager::new(
        config.oauth_providers.clone(),
        token_store.clone(),
        StateStore::new(),
        SessionStore::new(),
    ));
    Ok((manager, token_store))
}

/// Execute OAuth login command (authorization-code+PKCE, §4.F.1)
pub async fn login(provider: String, port: u16, no_browser: bool) -> Result<()> {
    println!("{}", format!("OAuth Login - {}", provider).bold());
    println!();

    let (manager, token_store) = build_manager().await?;

    println!("{} {}", "[1/3]".cyan().bold(), "Starting local callback server...");
    let (_callback_url, rx) = start_callback_server(port).await?;

    let (auth_url, _session_id) = manager.get_auth_url(CLI_USER_ID, &provider, None, None, None, None)?;

    println!("{} {}", "[2/3]".cyan().bold(), "Opening browser for authentication...");
    println!();
    println!("  {}", auth_url.green().underline());
    println!();

    if !no_browser {
        if try_copy_to_clipboard(&auth_url) {
            println!("  {} URL copied to clipboard!", "✓".green());
        }
        let _ = webbrowser::open(&auth_url);
    }

    println!("{} {}", "[3/3]".cyan().bold(), "Waiting for authorization callback...");
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}").unwrap());
    spinner.set_message("Waiting for callback...");
    spinner.enable_steady_tick(std::time::Duration::from_millis(100));

    let callback_result = tokio::time::timeout(std::time::Duration::from_secs(300), rx).await;
    spinner.finish_and_clear();

    let auth_response = match callback_result {
        Ok(Ok(Ok(response))) => response,
        Ok(Ok(Err(e))) => return Err(anyhow::anyhow!("authorization failed: {}", e)),
        Ok(Err(_)) => return Err(anyhow::anyhow!("callback channel closed unexpectedly")),
        Err(_) => return Err(anyhow::anyhow!("authorization timeout (5 minutes)")),
    };

    manager
        .handle_callback(auth_response.code, auth_response.state, auth_response.error)
        .await
        .map_err(|e| anyhow::anyhow!("authorization failed: {}", e))?;

    let token = token_store.get_token(&TokenKey::new(CLI_USER_ID, &provider)).await?;
    print_token_summary(&provider, &token);
    Ok(())
}

/// Execute OAuth device-login command (RFC 8628, §4.F.2)
pub async fn device_login(provider: String) -> Result<()> {
    println!("{}", format!("OAuth Device Login - {}", provider).bold());
    println!();

    let (manager, _token_store) = build_manager().await?;

    let data = manager.initiate_device_login(CLI_USER_ID, &provider, None).await?;

    println!("  Go to: {}", data.verification_uri.green().underline());
    println!("  Enter code: {}", data.user_code.bold());
    if let Some(complete) = &data.verification_uri_complete {
        println!("  Or open directly: {}", complete.green().underline());
        let _ = webbrowser::open(complete);
    }
    println!();

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}").unwrap());
    spinner.set_message("Waiting for approval...");
    spinner.enable_steady_tick(std::time::Duration::from_millis(100));

    let result = manager.complete_device_login(&provider, &data).await;
    spinner.finish_and_clear();

    let token = result.map_err(|e| anyhow::anyhow!("device login failed: {}", e))?;
    print_token_summary(&provider, &token);
    Ok(())
}

fn print_token_summary(provider: &str, token: &llm_gateway::oauth::types::OAuthToken) {
    println!();
    println!("{}", "Authentication successful!".green().bold());
    println!("  {} Token expires at: {}", "✓".green(), format_timestamp(token.expires_at));
    println!();
    println!("You can now use provider instances configured with oauth_provider = \"{}\"", provider);
}

fn format_timestamp(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Execute OAuth status command
pub async fn status(provider: Option<String>, verbose: bool) -> Result<()> {
    println!("{}", "OAuth Token Status".bold());
    println!();

    let token_store = Arc::new(TokenStore::new(std::path::PathBuf::from("./data/oauth_tokens.json")).await?);

    let providers_to_check = if let Some(p) = provider {
        vec![p]
    } else {
        token_store.list_providers(CLI_USER_ID).await
    };

    if providers_to_check.is_empty() {
        println!("  {} No OAuth tokens found", "i".blue());
        println!("  Use {} to authenticate", "llm-gateway oauth login <provider>".cyan());
        return Ok(());
    }

    for provider_name in providers_to_check {
        let key = TokenKey::new(CLI_USER_ID, &provider_name);
        match token_store.get_token(&key).await {
            Ok(token) => {
                let now = chrono::Utc::now().timestamp();
                let is_valid = token.valid(now);

                println!("{} {}", "Provider:".bold(), provider_name.cyan());
                println!("  {} {}", "Status:".bold(), if is_valid { "valid".green() } else { "expired".red() });
                println!("  {} {}", "Token Type:".bold(), token.token_type);
                println!("  {} {}", "Expires At:".bold(), format_timestamp(token.expires_at));

                if verbose {
                    println!("  {} {}", "Scopes:".bold(), token.scope);
                    println!("  {} {}", "Created At:".bold(), format_timestamp(token.created_at));
                }
                println!();
            }
            Err(_) => {
                println!("{} {}", "Provider:".bold(), provider_name.cyan());
                println!("  {} No token found", "i".blue());
                println!();
            }
        }
    }

    Ok(())
}

/// Execute OAuth refresh command
pub async fn refresh(provider: String) -> Result<()> {
    println!("{}", format!("Refreshing OAuth Token - {}", provider).bold());
    println!();

    let (manager, _token_store) = build_manager().await?;

    let new_token = manager
        .refresh_token(CLI_USER_ID, &provider)
        .await
        .map_err(|e| anyhow::anyhow!("token refresh failed: {}", e))?;

    println!("{}", "Token refreshed successfully!".green().bold());
    println!("  {} New expiration: {}", "✓".green(), format_timestamp(new_token.expires_at));
    Ok(())
}

/// Execute OAuth logout command
pub async fn logout(provider: String) -> Result<()> {
    println!("{}", format!("OAuth Logout - {}", provider).bold());
    println!();

    let token_store = Arc::new(TokenStore::new(std::path::PathBuf::from("./data/oauth_tokens.json")).await?);
    token_store
        .delete_token(&TokenKey::new(CLI_USER_ID, &provider))
        .await
        .map_err(|e| anyhow::anyhow!("failed to delete token: {}", e))?;

    println!("{}", "Token deleted successfully!".green().bold());
    println!("  You have been logged out from {}", provider.cyan());
    Ok(())
}
