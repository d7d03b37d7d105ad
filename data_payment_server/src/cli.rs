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
    const DISPLAY_ENVS: [&str; 17] = [
        "RUST_LOG",
        "DPG_HOST",
        "DPG_PORT",
        "DPG_STORE",
        "DPG_DATABASE_URL",
        "DPG_PUBLIC_URL",
        "DPG_DELIVERY_BASE_URL",
        "DPG_EFFECT_RETRY_INTERVAL",
        "DPG_EFFECT_LEASE",
        "DPG_HTTP_TIMEOUT",
        "DPG_USE_X_FORWARDED_FOR",
        "DPG_USE_FORWARDED",
        "DPG_CALLBACK_IP_WHITELIST",
        "DPG_PAYAPP_USER_ID",
        "DPG_PAYAPP_API_URL",
        "DPG_SIGNED_JSON_MERCHANT_ID",
        "DPG_SIGNED_JSON_API_URL",
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
