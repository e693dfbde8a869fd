use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use nats_client_core::{
	BincodeSerializer, ClientSettings, LoopbackServer, Message,
	MessageSerializer,
};
use tokio::time;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Installs a compact formatter when `RUST_LOG` is set (directly or through
/// a `.env` file). Stays silent otherwise.
fn setup_tracing() {
	dotenv::dotenv().ok();
	if std::env::var("RUST_LOG").is_err() {
		return;
	}
	let filter = tracing_subscriber::EnvFilter::try_from_default_env()
		.unwrap_or_else(|_| "info".into());
	tracing_subscriber::registry()
		.with(filter)
		.with(
			tracing_subscriber::fmt::layer()
				.with_target(true)
				.with_thread_ids(false)
				.compact(),
		)
		.init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	setup_tracing();

	let (server, client, connection) =
		LoopbackServer::connect(ClientSettings::default())?;
	let serializer = BincodeSerializer::new();

	// Pull subscription that closes itself after three readings
	let readings = client.subscribe("sensors.*.temperature")?;
	readings.unsubscribe_after(3)?;

	// Two workers sharing one queue group
	let handled = Arc::new(AtomicUsize::new(0));
	let counter = Arc::clone(&handled);
	let dispatcher =
		client.create_dispatcher_with_handler(move |message: Message| {
			counter.fetch_add(1, Ordering::Relaxed);
			info!(
				subject = %message.subject(),
				subscription_id = %message.sid(),
				"Job handled"
			);
			Ok(())
		})?;
	dispatcher.queue_subscribe("jobs", "workers")?;
	dispatcher.queue_subscribe("jobs", "workers")?;

	let rooms = [
		("kitchen", 21.5f64),
		("hall", 19.0),
		("attic", 24.25),
		("cellar", 12.0),
	];
	for (room, value) in rooms {
		let payload = MessageSerializer::<f64>::serialize(&serializer, &value)?;
		server.publish(format!("sensors.{room}.temperature"), payload);
	}
	for job in 0 .. 6u32 {
		let payload = MessageSerializer::<u32>::serialize(&serializer, &job)?;
		server.publish("jobs", payload);
	}

	while let Some(message) =
		readings.next_message(Some(Duration::from_millis(100))).await?
	{
		let value: f64 = message.decode(&serializer)?;
		println!("{} = {value}", message.subject());
		if !readings.is_active() {
			break;
		}
	}
	println!(
		"readings: delivered={} state={:?}",
		readings.delivered_count(),
		readings.state()
	);

	let inbox = client.create_inbox();
	println!("inbox: {inbox}");

	time::sleep(Duration::from_millis(50)).await;
	println!("jobs handled: {}", handled.load(Ordering::Relaxed));

	if let Err(err) = dispatcher.shutdown().await {
		warn!(error = %err, "Dispatcher shutdown failed");
	}
	connection.shutdown().await?;
	Ok(())
}
