use anyhow::{Context, Result};
use chrono::Utc;
use parley_application::{Collaborators, SessionWindowManager};
use parley_core::config::EngineConfig;
use parley_core::session::{EndReason, PartnerProfile, Session, SessionStatus};
use parley_infrastructure::{InMemoryStore, PassthroughGateway, TracingBillingBackend};
use std::sync::Arc;
use std::time::Duration;

const SESSION_ID: &str = "sim-session";
const PAYER: &str = "payer";
const EARNER: &str = "earner";

const DEFAULT_SCRIPT: [&str; 4] = [
    "Hi! Thanks for taking the call.",
    "namaste, happy to help",
    "Could you tell me about your city?",
    "it is busy but beautiful",
];

/// Runs one session between a payer and an earner and prints what each
/// side ends up seeing.
pub async fn run(
    config: EngineConfig,
    payer_lang: &str,
    earner_lang: &str,
    lines: Vec<String>,
) -> Result<()> {
    let store = Arc::new(InMemoryStore::new());
    let gateway = Arc::new(PassthroughGateway::new());
    for (id, name, lang) in [(PAYER, "Payer", payer_lang), (EARNER, "Earner", earner_lang)] {
        store.set_profile(PartnerProfile {
            partner_id: id.to_string(),
            display_name: name.to_string(),
            mother_tongue: lang.into(),
        });
    }
    store.add_session(Session {
        session_id: SESSION_ID.to_string(),
        conversation_id: format!("conv-{}", SESSION_ID),
        partner_id: EARNER.to_string(),
        payer_id: PAYER.to_string(),
        earner_id: EARNER.to_string(),
        rate_per_minute: 10.0,
        earn_rate_per_minute: 6.0,
        started_at: Utc::now(),
        status: SessionStatus::Active,
        end_reason: None,
    });

    let collaborators = |billing: Arc<TracingBillingBackend>| Collaborators {
        sessions: store.clone(),
        messages: store.clone(),
        feed: store.clone(),
        gateway: gateway.clone(),
        billing,
    };
    let payer_billing = Arc::new(TracingBillingBackend::default());
    let earner_billing = Arc::new(TracingBillingBackend::default());
    let mut payer = SessionWindowManager::new(
        PAYER,
        payer_lang.into(),
        config.clone(),
        collaborators(payer_billing.clone()),
    );
    let mut earner = SessionWindowManager::new(
        EARNER,
        earner_lang.into(),
        config,
        collaborators(earner_billing.clone()),
    );

    payer.start().await?;
    earner.start().await?;
    earner.accept(SESSION_ID).await?;

    let script: Vec<String> = if lines.is_empty() {
        DEFAULT_SCRIPT.iter().map(|s| s.to_string()).collect()
    } else {
        lines
    };

    for (i, line) in script.iter().enumerate() {
        let side = if i % 2 == 0 { &payer } else { &earner };
        let runtime = side
            .runtime(SESSION_ID)
            .context("Session window is not open")?;
        if let Err(e) = runtime.send(line).await {
            println!("⚠️  {} could not send {:?}: {}", side.user_id(), line, e);
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    for (manager, billing) in [(&payer, &payer_billing), (&earner, &earner_billing)] {
        let runtime = manager
            .runtime(SESSION_ID)
            .context("Session window is not open")?;
        println!("\n=== {} ===", manager.user_id());
        for message in runtime.pipeline().messages() {
            println!(
                "  {:>7}: {}",
                message.sender_id,
                message.display_text(manager.user_id())
            );
        }
        println!("{}", serde_json::to_string_pretty(&runtime.view())?);
        println!("billing signals: {:?}", billing.transitions());
    }
    println!("\ntranslation calls: {}", gateway.calls());

    payer.close_all(EndReason::Closed).await;
    earner.close_all(EndReason::Closed).await;
    Ok(())
}
