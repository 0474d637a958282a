use clap::Parser;
use hdrhistogram::Histogram;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use raft_proxy::protocol::{
    CommandResponse, OperationResponse, PublishMessage, QueryResponse, ResponseStatus,
};
use raft_proxy::session::{ResponseSequencer, SessionState};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Number of operations to sequence
    #[arg(short, long, default_value = "100000")]
    operations: u64,

    /// Number of operations admitted out of order per batch
    #[arg(short, long, default_value = "32")]
    window: u64,

    /// Percentage of operations that are commands triggering an event
    #[arg(short, long, default_value = "25")]
    event_percent: u32,

    /// Seed for the admission shuffle
    #[arg(short, long, default_value = "42")]
    seed: u64,
}

enum Admission {
    Response {
        sequence: u64,
        response: OperationResponse,
    },
    Event(PublishMessage),
}

fn main() {
    env_logger::try_init().unwrap_or_default();
    let args = Args::parse();

    let state = Arc::new(SessionState::new(1, "benchmark", Duration::from_secs(5)));
    let mut sequencer = ResponseSequencer::new(state);
    let mut rng = StdRng::seed_from_u64(args.seed);
    let mut histogram = Histogram::<u64>::new(3).unwrap();
    let fired = Arc::new(AtomicU64::new(0));

    println!(
        "Sequencing {} operations, window {}, {}% commands with events",
        args.operations, args.window, args.event_percent
    );

    let mut admitted = 0u64;
    let mut index = 0u64; // state machine index
    let mut event_index = 0u64; // last published event index
    let mut remaining = args.operations;

    let start = Instant::now();
    while remaining > 0 {
        let batch = remaining.min(args.window);
        remaining -= batch;

        // Build one window of traffic: responses may be reordered freely,
        // events keep their publication order.
        let mut responses = Vec::with_capacity(batch as usize);
        let mut events = Vec::new();
        for _ in 0..batch {
            let sequence = sequencer.next_request();
            index += 1;
            if rng.gen_range(0..100) < args.event_percent {
                // A command that triggers an event at its own index.
                events.push(PublishMessage {
                    session_id: 1,
                    event_index: index,
                    previous_index: event_index,
                    events: Vec::new(),
                });
                responses.push(Admission::Response {
                    sequence,
                    response: OperationResponse::Command(CommandResponse {
                        status: ResponseStatus::Ok,
                        index,
                        event_index: index,
                        payload: Vec::new(),
                    }),
                });
                event_index = index;
            } else {
                responses.push(Admission::Response {
                    sequence,
                    response: OperationResponse::Query(QueryResponse {
                        status: ResponseStatus::Ok,
                        index,
                        event_index,
                        payload: Vec::new(),
                    }),
                });
            }
        }

        responses.shuffle(&mut rng);
        let mut admissions = Vec::with_capacity(responses.len() + events.len());
        let mut events = events.into_iter();
        let mut next_event = events.next();
        for response in responses {
            while next_event.is_some() && rng.gen_bool(0.5) {
                admissions.push(Admission::Event(next_event.take().unwrap()));
                next_event = events.next();
            }
            admissions.push(response);
        }
        while let Some(event) = next_event {
            admissions.push(Admission::Event(event));
            next_event = events.next();
        }

        for admission in admissions {
            let counter = fired.clone();
            let began = Instant::now();
            match admission {
                Admission::Response { sequence, response } => {
                    sequencer.sequence_response(sequence, &response, move || {
                        counter.fetch_add(1, Ordering::Relaxed);
                    });
                }
                Admission::Event(message) => {
                    sequencer.sequence_event(&message, move || {
                        counter.fetch_add(1, Ordering::Relaxed);
                    });
                }
            }
            histogram
                .record(began.elapsed().as_nanos() as u64)
                .unwrap();
            admitted += 1;
        }

        // Every admission in the window must have drained.
        assert_eq!(sequencer.pending_responses(), 0);
        assert_eq!(sequencer.pending_events(), 0);
    }
    let elapsed = start.elapsed();

    println!("\nBenchmark Results:");
    println!("Total Admissions: {}", admitted);
    println!("Total Completions: {}", fired.load(Ordering::Relaxed));
    println!(
        "Average admissions/s: {:.2}",
        admitted as f64 / elapsed.as_secs_f64()
    );
    println!("\nDrain Cost Distribution (nanoseconds):");
    println!("p50: {}", histogram.value_at_percentile(50.0));
    println!("p90: {}", histogram.value_at_percentile(90.0));
    println!("p95: {}", histogram.value_at_percentile(95.0));
    println!("p99: {}", histogram.value_at_percentile(99.0));
    println!("p99.9: {}", histogram.value_at_percentile(99.9));
}
