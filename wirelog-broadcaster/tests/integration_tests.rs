use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tracing_subscriber::prelude::*;

use wirelog_broadcaster::{Broadcaster, BroadcasterConfig, BroadcasterError, LogRecord, Severity};

async fn start_local() -> (Broadcaster, SocketAddr) {
    let broadcaster = Broadcaster::try_start(BroadcasterConfig {
        bind_addr: "127.0.0.1:0".parse().unwrap(),
        queue_cap: 4096,
    })
    .await
    .unwrap();
    let addr = broadcaster.local_addr().unwrap();
    (broadcaster, addr)
}

async fn wait_until(what: &str, mut cond: impl FnMut() -> bool) {
    for _ in 0..500 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {}", what);
}

async fn read_line(reader: &mut BufReader<TcpStream>) -> String {
    let mut line = String::new();
    tokio::time::timeout(Duration::from_secs(2), reader.read_line(&mut line))
        .await
        .expect("timed out reading broadcast line")
        .expect("read failed");
    line
}

#[tokio::test]
async fn test_end_to_end_scenario() {
    let (broadcaster, addr) = start_local().await;
    let warning = LogRecord::new(Severity::Warning, "/src/app/disk.cpp", 42, "disk low");

    // No clients: the hook is inactive and nothing is even queued.
    broadcaster.handle_record(&warning);
    assert!(!broadcaster.hook_active());
    assert_eq!(broadcaster.pending_lines(), 0);

    // First client connecting activates interception.
    let client = TcpStream::connect(addr).await.unwrap();
    wait_until("hook activation", || broadcaster.hook_active()).await;

    broadcaster.handle_record(&warning);
    let mut reader = BufReader::new(client);
    assert_eq!(
        read_line(&mut reader).await,
        "warning  disk.cpp          42 disk low\r\n"
    );

    // Last client leaving deactivates it again; later records cost nothing.
    drop(reader);
    wait_until("hook deactivation", || !broadcaster.hook_active()).await;
    broadcaster.handle_record(&warning);
    assert_eq!(broadcaster.pending_lines(), 0);
}

#[tokio::test]
async fn test_two_clients_receive_identical_streams() {
    let (broadcaster, addr) = start_local().await;

    let first = TcpStream::connect(addr).await.unwrap();
    let second = TcpStream::connect(addr).await.unwrap();
    wait_until("both clients registered", || broadcaster.client_count() == 2).await;

    for n in 0..20 {
        broadcaster.handle_record(&LogRecord::new(
            Severity::Info,
            "stream.rs",
            n,
            format!("event {}", n),
        ));
    }

    let mut readers = (BufReader::new(first), BufReader::new(second));
    for n in 0..20 {
        let a = read_line(&mut readers.0).await;
        let b = read_line(&mut readers.1).await;
        assert_eq!(a, b, "clients diverged at line {}", n);
        assert!(
            a.ends_with(&format!(" event {}\r\n", n)),
            "out of order at {}: {:?}",
            n,
            a
        );
    }
}

#[tokio::test]
async fn test_late_client_gets_no_backlog() {
    let (broadcaster, addr) = start_local().await;

    let early = TcpStream::connect(addr).await.unwrap();
    wait_until("first client", || broadcaster.client_count() == 1).await;

    broadcaster.handle_record(&LogRecord::new(Severity::Info, "a.rs", 1, "early message"));
    let mut early_reader = BufReader::new(early);
    assert!(read_line(&mut early_reader).await.contains("early message"));

    let late = TcpStream::connect(addr).await.unwrap();
    wait_until("second client", || broadcaster.client_count() == 2).await;

    broadcaster.handle_record(&LogRecord::new(Severity::Info, "a.rs", 2, "late message"));

    // The late client's very first line is the post-connect message.
    let mut late_reader = BufReader::new(late);
    let first_seen = read_line(&mut late_reader).await;
    assert!(
        first_seen.contains("late message"),
        "late client replayed backlog: {:?}",
        first_seen
    );
    assert!(read_line(&mut early_reader).await.contains("late message"));
}

#[tokio::test]
async fn test_hook_toggles_on_first_and_last_client_only() {
    let (broadcaster, addr) = start_local().await;
    assert!(!broadcaster.hook_active());

    let first = TcpStream::connect(addr).await.unwrap();
    wait_until("activation on first client", || broadcaster.hook_active()).await;

    let second = TcpStream::connect(addr).await.unwrap();
    wait_until("second client", || broadcaster.client_count() == 2).await;
    assert!(broadcaster.hook_active());

    // An intermediate disconnect leaves the hook active.
    drop(second);
    wait_until("second client gone", || broadcaster.client_count() == 1).await;
    assert!(broadcaster.hook_active());

    drop(first);
    wait_until("deactivation on last client", || !broadcaster.hook_active()).await;
    assert_eq!(broadcaster.client_count(), 0);
}

#[tokio::test]
async fn test_bind_failure_degrades_without_panicking() {
    // Occupy a port so the broadcaster cannot have it.
    let occupied = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let config = BroadcasterConfig {
        bind_addr: occupied.local_addr().unwrap(),
        queue_cap: 64,
    };

    match Broadcaster::try_start(config.clone()).await {
        Err(BroadcasterError::Bind { addr, .. }) => {
            assert_eq!(addr, config.bind_addr);
        }
        other => panic!("expected bind error, got {:?}", other.map(|_| ())),
    }

    // The absorbing constructor hands back a degraded instance: no
    // listener, hook permanently inactive, queue still drained.
    let degraded = Broadcaster::start(config).await;
    assert!(degraded.local_addr().is_none());
    assert!(!degraded.hook_active());

    degraded.enqueue("orphan line\r\n".to_string());
    wait_until("degraded queue drain", || degraded.pending_lines() == 0).await;
    assert_eq!(degraded.client_count(), 0);
}

#[tokio::test]
async fn test_concurrent_emitters_produce_intact_lines() {
    let (broadcaster, addr) = start_local().await;

    let client = TcpStream::connect(addr).await.unwrap();
    wait_until("client registered", || broadcaster.hook_active()).await;

    let mut emitters = Vec::new();
    for thread in 0..8 {
        let handle = broadcaster.clone();
        // Plain OS threads: emission needs no async context.
        emitters.push(std::thread::spawn(move || {
            for n in 0..50 {
                handle.handle_record(&LogRecord::new(
                    Severity::Info,
                    "worker.rs",
                    n,
                    format!("t{} msg {}", thread, n),
                ));
            }
        }));
    }
    for emitter in emitters {
        emitter.join().unwrap();
    }

    let mut reader = BufReader::new(client);
    let mut per_thread_next = [0u32; 8];
    for _ in 0..400 {
        let line = read_line(&mut reader).await;
        assert!(line.starts_with("info     worker.rs"), "torn line: {:?}", line);
        assert!(line.ends_with("\r\n"));

        let message = line.trim_end().rsplit("msg ").next().unwrap();
        let thread: usize = line[line.find('t').unwrap() + 1..]
            .chars()
            .next()
            .unwrap()
            .to_digit(10)
            .unwrap() as usize;
        let n: u32 = message.parse().unwrap();
        // Each thread's own messages arrive in emission order.
        assert_eq!(n, per_thread_next[thread], "thread {} reordered", thread);
        per_thread_next[thread] += 1;
    }
    assert!(per_thread_next.iter().all(|&n| n == 50));
}

#[tokio::test]
async fn test_tracing_layer_feeds_connected_clients() {
    let (broadcaster, addr) = start_local().await;
    let subscriber = tracing_subscriber::registry().with(broadcaster.layer());
    let _guard = tracing::subscriber::set_default(subscriber);

    // Inactive hook: events are observed but never queued.
    tracing::info!("before any client");
    assert_eq!(broadcaster.pending_lines(), 0);

    let client = TcpStream::connect(addr).await.unwrap();
    wait_until("hook activation", || broadcaster.hook_active()).await;

    tracing::warn!("disk low");

    let mut reader = BufReader::new(client);
    let line = read_line(&mut reader).await;
    // File name is longer than its column, so the layout keeps it whole.
    assert!(line.starts_with("warning  integration_tests.rs"), "got {:?}", line);
    assert!(line.ends_with(" disk low\r\n"));
}
