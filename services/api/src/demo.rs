use crate::infra::{InMemorySessionStore, RecordingEventSink};
use chrono::{DateTime, Duration, TimeZone, Utc};
use clap::Args;
use notaria_queue::error::AppError;
use notaria_queue::queue::{
    AdmissionQueue, Clock, ExpirationSweeper, InMemoryTenantConfigs, ManualClock, QueueConfig,
    QueueView, SessionDraft, SessionId, SessionPriority, TenantId, TramiteType,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

type DemoQueue = AdmissionQueue<InMemorySessionStore, InMemoryTenantConfigs, RecordingEventSink>;

#[derive(Args, Debug)]
pub(crate) struct DemoArgs {
    /// Concurrent document-processing slots per notaría
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..))]
    pub(crate) max_concurrent: u32,
}

struct DemoRun {
    queue: Arc<DemoQueue>,
    clock: Arc<ManualClock>,
    events: RecordingEventSink,
}

fn opening_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 3, 9, 0, 0)
        .single()
        .unwrap_or_else(Utc::now)
}

fn build_demo(tenants: Vec<(TenantId, QueueConfig)>) -> DemoRun {
    let clock = Arc::new(ManualClock::new(opening_time()));
    let events = RecordingEventSink::default();
    let queue = Arc::new(AdmissionQueue::new(
        Arc::new(InMemorySessionStore::default()),
        Arc::new(InMemoryTenantConfigs::new(tenants)),
        Arc::new(events.clone()),
        clock.clone(),
    ));
    DemoRun {
        queue,
        clock,
        events,
    }
}

fn client(name: &str, tramite_type: TramiteType, priority: SessionPriority) -> SessionDraft {
    SessionDraft {
        document_id: format!("exp-{}", name.to_ascii_lowercase()),
        client_name: name.to_string(),
        tramite_type,
        priority,
    }
}

pub(crate) async fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    println!("Notaría session queue demo");
    admission_walkthrough(args.max_concurrent).await?;
    expiry_walkthrough(args.max_concurrent).await?;
    Ok(())
}

async fn admission_walkthrough(max_concurrent: u32) -> Result<(), AppError> {
    let tenant = TenantId::from("notaria-centro");
    let config = QueueConfig {
        max_concurrent_sessions: max_concurrent,
        ..QueueConfig::default()
    };
    let demo = build_demo(vec![(tenant.clone(), config)]);

    println!(
        "\nAdmission by priority ({} with {} slot(s))",
        tenant, max_concurrent
    );

    let mut served: Vec<(String, SessionId)> = Vec::new();
    for (name, tramite, priority) in [
        ("Ana", TramiteType::Compraventa, SessionPriority::Normal),
        ("Bruno", TramiteType::Testamento, SessionPriority::Critical),
        ("Carmen", TramiteType::PoderNotarial, SessionPriority::High),
    ] {
        let session = demo
            .queue
            .enqueue(&tenant, client(name, tramite, priority))
            .await?;
        println!(
            "- {} enqueued for {} ({}) -> {}",
            name,
            tramite.label(),
            priority.label(),
            session.status
        );
        served.push((name.to_string(), session.id));
        demo.clock.advance(Duration::minutes(1));
    }
    print_queue(&demo.queue.queue_view(&tenant).await?);

    let (first_name, first_id) = &served[0];
    demo.clock.advance(Duration::minutes(2));
    demo.queue.call(*first_id).await?;
    println!("- {} called to the desk", first_name);
    demo.clock.advance(Duration::minutes(15));
    demo.queue.complete(*first_id).await?;
    println!("- {} completed after 15 minutes", first_name);
    print_queue(&demo.queue.queue_view(&tenant).await?);

    print_events(&demo.events);
    Ok(())
}

async fn expiry_walkthrough(max_concurrent: u32) -> Result<(), AppError> {
    let tenant = TenantId::from("notaria-norte");
    let config = QueueConfig {
        max_concurrent_sessions: max_concurrent,
        session_timeout_minutes: 10,
        ..QueueConfig::default()
    };
    let demo = build_demo(vec![(tenant.clone(), config)]);

    println!("\nDeadline expiry ({} with a 10 minute session timeout)", tenant);

    let session = demo
        .queue
        .enqueue(
            &tenant,
            client("Diego", TramiteType::Certificacion, SessionPriority::Normal),
        )
        .await?;
    println!(
        "- Diego enqueued -> {} (expires {})",
        session.status,
        session.expires_at.format("%H:%M")
    );

    demo.clock.advance(Duration::minutes(11));
    let sweeper = ExpirationSweeper::new(demo.queue.clone(), std::time::Duration::from_secs(30));
    let report = sweeper.sweep_once(&CancellationToken::new()).await;
    println!(
        "- Sweep at {}: {} expired, {} admitted, {} failure(s)",
        demo.clock.now().format("%H:%M"),
        report.expired,
        report.admitted,
        report.failures
    );

    let after = demo.queue.get(session.id).await?;
    println!("- Diego is now {}", after.status);
    match demo.queue.call(session.id).await {
        Ok(session) => println!("- Unexpected call succeeded -> {}", session.status),
        Err(err) => println!("- Calling Diego is rejected: {}", err),
    }

    print_events(&demo.events);
    Ok(())
}

fn print_queue(view: &QueueView) {
    println!(
        "  Queue {}: {}/{} slots occupied",
        view.notaria_id, view.occupied, view.capacity
    );
    for session in &view.ranked {
        let wait = session
            .estimated_wait_minutes
            .map(|minutes| format!("~{minutes} min"))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "    #{} {} [{}] {} | wait {}",
            session.position.unwrap_or_default(),
            session.client_name,
            session.priority.label(),
            session.status,
            wait
        );
    }
    for session in &view.active {
        println!("    at desk: {} ({})", session.client_name, session.tramite_type.label());
    }
}

fn print_events(events: &RecordingEventSink) {
    let transitions = events.drain();
    println!("  Event stream ({} transitions):", transitions.len());
    for transition in transitions {
        println!(
            "    {} {} {} -> {}",
            transition.at.format("%H:%M"),
            transition.session.client_name,
            transition
                .previous
                .map(|status| status.label())
                .unwrap_or("new"),
            transition.current
        );
    }
}
