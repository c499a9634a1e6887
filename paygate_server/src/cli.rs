use std::{env, env::VarError};

/// There's no real CLI for the server, so just do quick 'n dirty
pub fn handle_command_line_args() -> bool {
    let has_cli_args = env::args().count() > 1;
    if has_cli_args {
        // We don't expect any CLI args, so always print the help
        display_readme();
        display_envs();
    }
    has_cli_args
}

fn display_readme() {
    const README: &str = include_str!("./cli-help.txt");
    println!("\n{README}\n");
}

fn display_envs() {
    // Be explicit about which envars to print, so as to avoid accidentally exposing secrets
    const DISPLAY_ENVS: [&str; 23] = [
        "RUST_LOG",
        "PAYGATE_HOST",
        "PAYGATE_PORT",
        "PAYGATE_DATABASE_URL",
        "PAYGATE_SESSION_TTL",
        "PAYGATE_PROVIDER_TIMEOUT",
        "PAYGATE_RETRY_ATTEMPTS",
        "PAYGATE_MAX_CARTS",
        "PAYGATE_VERIFY_GRACE_PERIOD",
        "PAYGATE_RECONCILE_INTERVAL",
        "PAYGATE_STALE_FULFILLMENT_TIMEOUT",
        "PAYGATE_EXCHANGE_RATES",
        "PAYGATE_MOMO_BASE_URL",
        "PAYGATE_MOMO_CURRENCY",
        "PAYGATE_MOMO_COUNTRY",
        "PAYGATE_CARD_BASE_URL",
        "PAYGATE_CARD_CURRENCY",
        "PAYGATE_CARD_CALLBACK_URL",
        "PAYGATE_PREPAID_AUTH_URL",
        "PAYGATE_PREPAID_TOPUP_URL",
        "PAYGATE_PREPAID_GIFTCARD_URL",
        "PAYGATE_PREPAID_COUNTRY_CODE",
        "PAYGATE_PREPAID_CLIENT_ID",
    ];

    println!("Current environment values (EXCLUDING variables that contain secrets):");
    DISPLAY_ENVS.iter().for_each(|&name| {
        let val = match env::var(name) {
            Ok(s) => s,
            Err(VarError::NotPresent) => "Not set".into(),
            Err(VarError::NotUnicode(s)) => format!("Invalid value: {}", s.to_string_lossy()),
        };
        println!("  {name:<35} {val:<15}");
    })
}
