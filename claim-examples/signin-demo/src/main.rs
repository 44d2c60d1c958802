use std::time::Duration;

use anyhow::{bail, Result};
use claim_auth::SignInOutcome;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info");
    }
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let mut args = std::env::args().skip(1);
    let (Some(email), Some(password)) = (args.next(), args.next()) else {
        bail!("usage: signin-demo <email> <password>");
    };

    let mut demo = signin_demo::build().await?;

    match demo.sign_in(&email, &password).await {
        SignInOutcome::Done => {
            println!("[signin-demo] signed in as {email}");
            match demo.landing(Duration::from_secs(2)).await {
                Some(landing) => println!("[signin-demo] landing: {}", landing.path()),
                None => println!("[signin-demo] session not established yet"),
            }
            if let Some(name) = demo.session.current().profile_name {
                println!("[signin-demo] welcome, {name}");
            }
        }
        SignInOutcome::Failed(message) => println!("[signin-demo] sign-in failed: {message}"),
        SignInOutcome::ValidationError(message) => println!("[signin-demo] invalid input: {message}"),
    }

    Ok(())
}
