//! Compares retry policies against a scripted, always-failing transport in virtual time.
use futures::FutureExt;
use paylike_client::{
    transport_fn, Backoff, CallOptions, Client, Clock, Endpoint, Event, Jitter, LogEntry,
    ManualClock, MemorySink, RequestError, RequestOptions, RetryDecision, RetryPolicy,
};
use std::time::Duration;

fn run(label: &str, opts: CallOptions) -> Result<(), Box<dyn std::error::Error>> {
    let clock = ManualClock::new(0);
    let sink = MemorySink::new();
    let transport = transport_fn(|_: Endpoint, _: RequestOptions| async {
        Err::<Event, _>(RequestError::Server { status: 503, status_text: "Service Unavailable".into() })
    });
    let client = Client::builder()
        .clock(clock.clone())
        .log(sink.clone())
        .transport(transport)
        .build()?;

    let mut call = Box::pin(client.tokenize_with("pcn", "4100000000000000", opts));
    let result = loop {
        if let Some(result) = call.as_mut().now_or_never() {
            break result;
        }
        clock.advance_to_next();
    };

    println!("=== {label} ===");
    for record in sink.records() {
        if let LogEntry::RequestFailed { attempts, retry_after, .. } = record.entry {
            println!("  attempt {attempts:>2} failed, retry after {retry_after}");
        }
    }
    match result {
        Ok(event) => println!("  succeeded at t={}ms: {event}\n", clock.now_millis()),
        Err(err) => println!("  gave up at t={}ms: {err}\n", clock.now_millis()),
    }
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    run("default policy", CallOptions::new())?;

    let exponential = RetryPolicy::<RequestError>::builder()
        .max_retries(5)
        .backoff(Backoff::exponential(Duration::from_millis(50)).with_max(Duration::from_secs(1))?)
        .with_jitter(Jitter::equal())
        .build();
    run("exponential with equal jitter", CallOptions::new().retry_after(exponential))?;

    run(
        "closure: three quick retries",
        CallOptions::new().retry_after(|_: &RequestError, attempts: u32| {
            if attempts <= 3 {
                RetryDecision::after_millis(150)
            } else {
                RetryDecision::Decline
            }
        }),
    )?;
    Ok(())
}
