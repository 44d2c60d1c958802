mod config;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use claim_auth::{
    CredentialProvider, Landing, ProfileResolver, Registrar, ReservationDraft, SessionContext,
    SessionState, SessionSync, SignInOutcome, SignInService,
};
use claim_auth_local::LocalCredentialProvider;
use claim_core::{DirectoryStore, MemoryDirectory};
use tokio::sync::watch;
use tracing::info;

pub use config::{DemoConfig, DemoSeed, ENV_PREFIX};

pub struct Demo {
    pub service: SignInService,
    pub session: SessionContext,
    session_rx: watch::Receiver<SessionState>,
}

/// Wire the in-memory directory, the local provider and the session sync,
/// then seed one reservation.
pub async fn build() -> Result<Demo> {
    let cfg = config::config()?;

    let memory = Arc::new(MemoryDirectory::new());
    let dir: Arc<dyn DirectoryStore> = memory.clone();
    let provider = Arc::new(LocalCredentialProvider::new(cfg.local));

    let registrar = Registrar::new(dir.clone(), cfg.options.clone());
    let reference = registrar
        .reserve(
            cfg.seed.kind,
            ReservationDraft {
                email: cfg.seed.email.clone(),
                given_name: cfg.seed.given_name,
                surname: cfg.seed.surname,
                role: None,
            },
        )
        .await?;
    info!(record = %reference, email = %cfg.seed.email, "reservation seeded");
    if cfg.store_offline {
        memory.set_available(false);
        info!("directory taken offline");
    }

    let session = SessionContext::new(false);
    let (tx, session_rx) = watch::channel(session.current());
    session.subscribe(Arc::new(move |state: &SessionState| {
        let _ = tx.send(state.clone());
    }));

    if let Some(stream) = provider.watch_identity() {
        let sync = SessionSync::new(
            session.clone(),
            ProfileResolver::new(Some(dir.clone()), cfg.options.clone()),
            &cfg.options,
        );
        tokio::spawn(sync.run(stream));
    }

    let service = SignInService::new(provider, Some(dir), cfg.options).with_session(session.clone());

    Ok(Demo {
        service,
        session,
        session_rx,
    })
}

impl Demo {
    pub async fn sign_in(&self, email: &str, password: &str) -> SignInOutcome {
        self.service.submit(email, password).await
    }

    /// Wait for the session to show a signed-in user, then read the landing.
    pub async fn landing(&mut self, wait: Duration) -> Option<Landing> {
        let signed_in = matches!(
            tokio::time::timeout(wait, self.session_rx.wait_for(|state| state.user.is_some())).await,
            Ok(Ok(_))
        );
        if signed_in {
            self.service.landing()
        } else {
            None
        }
    }
}
