//! Loads compile-time settings from an optional `.env` file.

const OVERRIDES: &[&str] = &["PMBRIDGE_DEVICE_NAME"];

fn main() {
    println!("cargo:rerun-if-changed=.env");
    for key in OVERRIDES {
        println!("cargo:rerun-if-env-changed={key}");
    }

    // A missing .env is fine: the defaults in pmbridge-core apply.
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            panic!("failed to read .env: {e}");
        }
    }

    for key in OVERRIDES {
        if let Ok(value) = std::env::var(key) {
            println!("cargo:rustc-env={key}={value}");
        }
    }

    println!("cargo:rustc-link-arg=-Tlinkall.x");
}
