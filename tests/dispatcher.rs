use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use nats_client_core::errors::{HandlerError, SubscriptionError};
use nats_client_core::{
	BoxError, ClientError, ClientSettings, ControlFrame, ErrorListener,
	LoopbackServer, Message, NatsClient, NatsConnection, SubscriptionId,
};

const WAIT: Duration = Duration::from_secs(2);

fn connect() -> (Arc<LoopbackServer>, NatsClient, NatsConnection) {
	LoopbackServer::connect(ClientSettings::default()).unwrap()
}

async fn wait_until(condition: impl Fn() -> bool) {
	let polling = async {
		while !condition() {
			tokio::time::sleep(Duration::from_millis(5)).await;
		}
	};
	tokio::time::timeout(WAIT, polling)
		.await
		.expect("condition not reached in time");
}

fn counting_handler(
	counter: Arc<AtomicUsize>,
) -> impl Fn(Message) -> Result<(), BoxError> + Send + Sync + 'static {
	move |_message| {
		counter.fetch_add(1, Ordering::SeqCst);
		Ok(())
	}
}

#[tokio::test]
async fn test_default_and_subject_handlers_each_run_once() {
	let (server, client, _connection) = connect();
	let default_calls = Arc::new(AtomicUsize::new(0));
	let first_calls = Arc::new(AtomicUsize::new(0));
	let second_calls = Arc::new(AtomicUsize::new(0));

	let dispatcher = client
		.create_dispatcher_with_handler(counting_handler(default_calls.clone()))
		.unwrap();
	dispatcher.subscribe("foo").unwrap();
	dispatcher
		.subscribe_with_handler("foo", counting_handler(first_calls.clone()))
		.unwrap();
	dispatcher
		.subscribe_with_handler("foo", counting_handler(second_calls.clone()))
		.unwrap();
	assert_eq!(dispatcher.subscription_count(), 3);

	assert_eq!(server.publish("foo", "one"), 3);
	let counters = [&default_calls, &first_calls, &second_calls];
	wait_until(|| counters.iter().all(|c| c.load(Ordering::SeqCst) == 1)).await;

	tokio::time::sleep(Duration::from_millis(20)).await;
	for counter in counters {
		assert_eq!(counter.load(Ordering::SeqCst), 1);
	}
}

#[tokio::test]
async fn test_messages_are_handled_in_arrival_order() {
	let (server, client, _connection) = connect();
	let seen = Arc::new(Mutex::new(Vec::new()));
	let recorder = Arc::clone(&seen);
	let dispatcher = client
		.create_dispatcher_with_handler(move |message: Message| {
			let n: u32 = std::str::from_utf8(message.payload())?.parse()?;
			recorder.lock().unwrap().push(n);
			Ok(())
		})
		.unwrap();
	dispatcher.subscribe("a").unwrap();
	dispatcher.subscribe("b").unwrap();

	for n in 0 .. 20u32 {
		let subject = if n % 2 == 0 { "a" } else { "b" };
		server.publish(subject, n.to_string());
	}
	wait_until(|| seen.lock().unwrap().len() == 20).await;
	assert_eq!(*seen.lock().unwrap(), (0 .. 20).collect::<Vec<u32>>());
}

#[tokio::test]
async fn test_handlers_never_overlap() {
	let (server, client, _connection) = connect();
	let running = Arc::new(AtomicUsize::new(0));
	let overlaps = Arc::new(AtomicUsize::new(0));
	let done = Arc::new(AtomicUsize::new(0));
	let (r, o, d) = (running.clone(), overlaps.clone(), done.clone());
	let dispatcher = client
		.create_dispatcher_with_handler(move |_message: Message| {
			if r.fetch_add(1, Ordering::SeqCst) > 0 {
				o.fetch_add(1, Ordering::SeqCst);
			}
			std::thread::sleep(Duration::from_millis(1));
			r.fetch_sub(1, Ordering::SeqCst);
			d.fetch_add(1, Ordering::SeqCst);
			Ok(())
		})
		.unwrap();
	dispatcher.subscribe("x").unwrap();
	dispatcher.subscribe("y").unwrap();

	for _ in 0 .. 10 {
		server.publish("x", "1");
		server.publish("y", "2");
	}
	wait_until(|| done.load(Ordering::SeqCst) == 20).await;
	assert_eq!(overlaps.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_subscribe_without_default_handler_fails() {
	let (server, client, _connection) = connect();
	let dispatcher = client.create_dispatcher().unwrap();

	let err = dispatcher.subscribe("foo").unwrap_err();
	assert!(err.is_invalid_state());
	assert!(matches!(
		err,
		ClientError::InvalidState(SubscriptionError::NoDefaultHandler(id))
			if id == dispatcher.id()
	));
	assert!(dispatcher.queue_subscribe("foo", "q").is_err());
	assert!(server.frames().is_empty());

	let calls = Arc::new(AtomicUsize::new(0));
	dispatcher
		.subscribe_with_handler("foo", counting_handler(calls.clone()))
		.unwrap();
	server.publish("foo", "x");
	wait_until(|| calls.load(Ordering::SeqCst) == 1).await;
}

#[tokio::test]
async fn test_bad_subjects_are_rejected_before_state_checks() {
	let (_server, client, _connection) = connect();
	let dispatcher = client.create_dispatcher().unwrap();

	assert!(dispatcher.subscribe("").unwrap_err().is_invalid_argument());
	assert!(
		dispatcher
			.queue_subscribe("foo", "")
			.unwrap_err()
			.is_invalid_argument()
	);
	assert!(dispatcher.unsubscribe("foo bar").unwrap_err().is_invalid_argument());
}

#[tokio::test]
async fn test_unsubscribe_subject_removes_every_subscription_on_it() {
	let (server, client, _connection) = connect();
	let calls = Arc::new(AtomicUsize::new(0));
	let dispatcher = client
		.create_dispatcher_with_handler(counting_handler(calls.clone()))
		.unwrap();
	let foo = dispatcher.subscribe("foo").unwrap();
	let foo_again = dispatcher.subscribe("foo").unwrap();
	let bar = dispatcher.subscribe("bar").unwrap();

	dispatcher.unsubscribe("foo").unwrap();
	assert!(!foo.is_active());
	assert!(!foo_again.is_active());
	assert!(bar.is_active());
	assert_eq!(dispatcher.subscription_count(), 1);

	assert_eq!(server.publish("foo", "x"), 0);
	assert_eq!(server.publish("bar", "x"), 1);
	wait_until(|| calls.load(Ordering::SeqCst) == 1).await;

	// nothing left on that subject
	dispatcher.unsubscribe("foo").unwrap();
}

#[tokio::test]
async fn test_unsubscribe_after_on_subject() {
	let (server, client, _connection) = connect();
	let calls = Arc::new(AtomicUsize::new(0));
	let dispatcher = client
		.create_dispatcher_with_handler(counting_handler(calls.clone()))
		.unwrap();
	let sub = dispatcher.subscribe("foo").unwrap();

	dispatcher.unsubscribe_after("foo", 2).unwrap();
	assert!(server.frames().contains(&ControlFrame::Unsubscribe {
		sid: sub.sid(),
		max_messages: Some(2),
	}));
	for _ in 0 .. 5 {
		server.publish("foo", "x");
	}
	wait_until(|| !sub.is_active()).await;
	tokio::time::sleep(Duration::from_millis(20)).await;
	assert_eq!(calls.load(Ordering::SeqCst), 2);
	assert_eq!(sub.delivered_count(), 2);
	assert_eq!(dispatcher.subscription_count(), 0);
}

#[tokio::test]
async fn test_subscription_unsubscribe_through_handle() {
	let (server, client, _connection) = connect();
	let calls = Arc::new(AtomicUsize::new(0));
	let dispatcher = client
		.create_dispatcher_with_handler(counting_handler(calls.clone()))
		.unwrap();
	let sub = dispatcher.subscribe("foo").unwrap();

	sub.unsubscribe().unwrap();
	assert!(sub.unsubscribe().unwrap_err().is_invalid_state());
	assert_eq!(dispatcher.subscription_count(), 0);
	assert_eq!(server.publish("foo", "x"), 0);
}

#[tokio::test]
async fn test_dispatcher_subscription_cannot_be_pulled() {
	let (_server, client, _connection) = connect();
	let dispatcher = client.create_dispatcher_with_handler(|_| Ok(())).unwrap();
	let sub = dispatcher.subscribe("foo").unwrap();
	assert_eq!(sub.dispatcher_id(), Some(dispatcher.id()));

	let err = sub.next_message(Some(Duration::ZERO)).await.unwrap_err();
	assert!(matches!(
		err,
		ClientError::InvalidState(SubscriptionError::DispatcherOwned { .. })
	));
}

#[derive(Default)]
struct RecordingListener {
	failures: Mutex<Vec<(SubscriptionId, String)>>,
}

impl ErrorListener for RecordingListener {
	fn handler_failed(
		&self,
		sid: SubscriptionId,
		_subject: &str,
		error: &HandlerError,
	) {
		self.failures.lock().unwrap().push((sid, error.to_string()));
	}
}

#[tokio::test]
async fn test_handler_failures_are_reported_and_worker_continues() {
	let server = Arc::new(LoopbackServer::new());
	let listener = Arc::new(RecordingListener::default());
	let (client, connection) = NatsClient::with_error_listener(
		server.clone(),
		ClientSettings::default(),
		listener.clone(),
	)
	.unwrap();
	server.attach(connection.router());

	let handled = Arc::new(AtomicUsize::new(0));
	let counter = Arc::clone(&handled);
	let dispatcher = client
		.create_dispatcher_with_handler(move |message: Message| {
			match &message.payload()[..] {
				| b"error" => Err("rejected".into()),
				| b"panic" => panic!("handler exploded"),
				| _ => {
					counter.fetch_add(1, Ordering::SeqCst);
					Ok(())
				}
			}
		})
		.unwrap();
	let sub = dispatcher.subscribe("jobs").unwrap();

	server.publish("jobs", "error");
	server.publish("jobs", "panic");
	server.publish("jobs", "ok");
	wait_until(|| handled.load(Ordering::SeqCst) == 1).await;

	let failures = listener.failures.lock().unwrap().clone();
	assert_eq!(failures.len(), 2);
	assert!(failures.iter().all(|(sid, _)| *sid == sub.sid()));
	assert!(failures[0].1.contains("rejected"));
	assert!(failures[1].1.contains("handler exploded"));
	assert!(dispatcher.is_active());
	connection.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_close_dispatcher_unsubscribes_everything() {
	let (server, client, _connection) = connect();
	let dispatcher = client.create_dispatcher_with_handler(|_| Ok(())).unwrap();
	let foo = dispatcher.subscribe("foo").unwrap();
	let bar = dispatcher.queue_subscribe("bar", "q").unwrap();

	client.close_dispatcher(&dispatcher).unwrap();
	assert!(!dispatcher.is_active());
	assert!(!foo.is_active());
	assert!(!bar.is_active());
	for sid in [foo.sid(), bar.sid()] {
		assert!(server.frames().contains(&ControlFrame::Unsubscribe {
			sid,
			max_messages: None,
		}));
	}
	assert_eq!(server.interest_count(), 0);

	let err = client.close_dispatcher(&dispatcher).unwrap_err();
	assert!(err.is_invalid_state());
	let err = dispatcher.subscribe("foo").unwrap_err();
	assert!(matches!(
		err,
		ClientError::InvalidState(SubscriptionError::DispatcherClosed(_))
	));
	assert!(foo.unsubscribe().unwrap_err().is_invalid_state());
}

#[tokio::test]
async fn test_shutdown_waits_for_running_handler() {
	let (server, client, _connection) = connect();
	let finished = Arc::new(AtomicUsize::new(0));
	let started = Arc::new(AtomicUsize::new(0));
	let (s, f) = (started.clone(), finished.clone());
	let dispatcher = client
		.create_dispatcher_with_handler(move |_message: Message| {
			s.fetch_add(1, Ordering::SeqCst);
			std::thread::sleep(Duration::from_millis(50));
			f.fetch_add(1, Ordering::SeqCst);
			Ok(())
		})
		.unwrap();
	dispatcher.subscribe("slow").unwrap();
	server.publish("slow", "x");
	wait_until(|| started.load(Ordering::SeqCst) == 1).await;

	dispatcher.shutdown().await.unwrap();
	assert_eq!(finished.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_connection_close_stops_dispatchers() {
	let (server, client, connection) = connect();
	let dispatcher = client.create_dispatcher_with_handler(|_| Ok(())).unwrap();
	let sub = dispatcher.subscribe("foo").unwrap();

	connection.on_closed();
	assert!(!dispatcher.is_active());
	assert!(!sub.is_active());
	assert_eq!(server.publish("foo", "x"), 0);
	assert!(client.create_dispatcher().unwrap_err().is_invalid_state());
	assert!(dispatcher.unsubscribe("foo").unwrap_err().is_invalid_state());
	connection.shutdown().await.unwrap();
}

#[test]
fn test_create_dispatcher_needs_runtime() {
	let (_server, client, _connection) = connect();
	let err = client.create_dispatcher().unwrap_err();
	assert!(matches!(err, ClientError::Runtime(_)));
}

#[tokio::test]
async fn test_blocking_handler_does_not_stall_other_dispatchers() {
	let (server, client, _connection) = connect();
	let (signal_tx, signal_rx) = std::sync::mpsc::channel::<()>();
	let signal_rx = Mutex::new(signal_rx);
	let (outcome_tx, mut outcome_rx) = tokio::sync::mpsc::unbounded_channel();

	let waiting = client
		.create_dispatcher_with_handler(move |_message: Message| {
			let signalled = signal_rx.lock().unwrap().recv_timeout(WAIT).is_ok();
			outcome_tx.send(signalled)?;
			Ok(())
		})
		.unwrap();
	waiting.subscribe("a").unwrap();
	let signalling = client
		.create_dispatcher_with_handler(move |_message: Message| {
			signal_tx.send(())?;
			Ok(())
		})
		.unwrap();
	signalling.subscribe("b").unwrap();

	// the first handler blocks until the second dispatcher's handler runs
	server.publish("a", "wait");
	server.publish("b", "signal");
	let signalled = tokio::time::timeout(WAIT * 2, outcome_rx.recv())
		.await
		.expect("blocked handler must finish");
	assert_eq!(signalled, Some(true));
}
