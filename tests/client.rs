//! Typed client tests against a scripted mock LWRP device

use lwrp_client::{Category, IoDirection, LwrpClient, PinLevel, SessionConfig};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::timeout;

async fn mock_device<F, Fut>(script: F) -> SocketAddr
where
    F: FnOnce(TcpStream) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        script(stream).await;
    });
    addr
}

async fn connect(addr: SocketAddr) -> LwrpClient {
    LwrpClient::connect_with(
        addr.ip().to_string(),
        SessionConfig {
            port: addr.port(),
            command_timeout: Duration::from_secs(2),
        },
    )
    .await
    .unwrap()
}

#[tokio::test]
async fn device_and_network_queries_return_typed_records() {
    let addr = mock_device(|stream| async move {
        let (read, mut write) = stream.into_split();
        let mut lines = BufReader::new(read).lines();
        loop {
            let Ok(Some(line)) = lines.next_line().await else {
                break;
            };
            let reply: &[u8] = match line.as_str() {
                "VER" => b"VER\nLWRP=1.1\nDEVN=xnode\nSYSV=2.1.4\nNSRC=8/STEREO\nNDST=8\nNGPI=4\nNGPO=4\n\n",
                "IP" => b"IP\naddress=10.0.0.5\nnetmask=255.255.255.0\n\n",
                "SET" => b"SET\ngateway=10.0.0.1\nhostname=node-1\n\n",
                _ => continue,
            };
            write.write_all(reply).await.unwrap();
        }
    })
    .await;

    let client = connect(addr).await;

    let device = client.device_data().await.unwrap();
    assert_eq!(device.device_name.as_deref(), Some("xnode"));
    assert_eq!(device.source_count, Some(8));
    assert_eq!(device.gpi_count, Some(4));

    let network = client.network_data().await.unwrap();
    assert_eq!(network.address.as_deref(), Some("10.0.0.5"));
    assert_eq!(network.gateway.as_deref(), Some("10.0.0.1"));
    assert_eq!(network.hostname.as_deref(), Some("node-1"));

    client.stop().await;
}

#[tokio::test]
async fn setters_emit_the_expected_wire_lines() {
    let (seen_tx, mut seen_rx) = mpsc::unbounded_channel::<String>();
    let addr = mock_device(move |stream| async move {
        let (read, _write) = stream.into_split();
        let mut lines = BufReader::new(read).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let _ = seen_tx.send(line);
        }
    })
    .await;

    let client = connect(addr).await;

    client.set_source(1, "239.192.0.1").await.unwrap();
    client.set_destination(2, "239.192.0.7").await.unwrap();
    client.set_gpo(3, 3, PinLevel::Low).await.unwrap();
    client.set_gpi(4, 1, PinLevel::High).await.unwrap();
    client.set_gpo_text(5, "ON AIR").await.unwrap();
    client.enable_gpio_updates().await.unwrap();

    let expected = [
        "SOURCE 1 RTPA=239.192.0.1",
        "DESTINATION 2 ADDR=239.192.0.7",
        "GPO 3 PINS=xxlxx",
        "GPI 4 PINS=hxxxx",
        "GPO 5 CMD=ON AIR",
        "ADD GPI",
        "ADD GPO",
    ];
    for want in expected {
        let line = timeout(Duration::from_secs(2), seen_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(line, want);
    }

    client.stop().await;
}

#[tokio::test]
async fn threshold_commands_return_the_alert_acknowledgement() {
    let addr = mock_device(|stream| async move {
        let (read, mut write) = stream.into_split();
        let mut lines = BufReader::new(read).lines();
        let line = lines.next_line().await.unwrap().unwrap();
        assert_eq!(line, "LEVEL ICH 2 LOW.LEVEL=-45 LOW.TIME=5000");
        write
            .write_all(b"LEVEL ICH 2\nLOW=0\n\n")
            .await
            .unwrap();
        while let Ok(Some(_)) = lines.next_line().await {}
    })
    .await;

    let client = connect(addr).await;
    let alert = client
        .set_silence_threshold(IoDirection::Input, 2, -45, 5000)
        .await
        .unwrap();
    assert_eq!(alert.io, IoDirection::Input);
    assert_eq!(alert.channel, 2);
    assert_eq!(alert.silence, Some(false));

    client.stop().await;
}

#[tokio::test]
async fn typed_gpio_subscription_delivers_parsed_records() {
    let addr = mock_device(|stream| async move {
        let (read, mut write) = stream.into_split();
        let mut lines = BufReader::new(read).lines();
        // ADD GPI, ADD GPO
        lines.next_line().await.unwrap();
        lines.next_line().await.unwrap();
        write.write_all(b"GPI 2\nPINS=hHlxL\n\n").await.unwrap();
        while let Ok(Some(_)) = lines.next_line().await {}
    })
    .await;

    let client = connect(addr).await;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let client_tx = tx.clone();
    let handle = client.on_gpio(move |gpio| {
        let _ = client_tx.send(gpio);
    });
    client.enable_gpio_updates().await.unwrap();

    let gpio = timeout(Duration::from_secs(2), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(gpio.channel, 2);
    assert_eq!(gpio.pins.len(), 5);
    assert_eq!(gpio.pins[3], None);
    assert_eq!(gpio.pins[1].unwrap().changing, true);

    assert!(client.unsubscribe(&handle));
    drop(tx);

    client.stop().await;
}

#[tokio::test]
async fn connect_to_a_closed_port_fails_with_connection_error() {
    // bind then drop to get a port that refuses connections
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = LwrpClient::connect_with(
        "127.0.0.1",
        SessionConfig {
            port: addr.port(),
            command_timeout: Duration::from_secs(1),
        },
    )
    .await
    .err()
    .expect("connect must fail");
    assert!(matches!(err, lwrp_client::LwrpError::Connect { .. }));
}

#[tokio::test]
async fn source_query_and_subscription_share_one_connection() {
    let addr = mock_device(|stream| async move {
        let (read, mut write) = stream.into_split();
        let mut lines = BufReader::new(read).lines();
        let line = lines.next_line().await.unwrap().unwrap();
        assert_eq!(line, "SOURCE 1");
        // push an update for another channel, then answer the query
        write
            .write_all(b"SOURCE 4\nPSNM=Aux\nRTPE=0\n\nSOURCE 1\nPSNM=Mic\nRTPE=1\nRTPA=239.192.0.1\n\n")
            .await
            .unwrap();
        while let Ok(Some(_)) = lines.next_line().await {}
    })
    .await;

    let client = connect(addr).await;

    let (tx, mut rx) = mpsc::unbounded_channel();
    client.on_source(move |source| {
        let _ = tx.send(source);
    });

    let source = client.source_data(1).await.unwrap();
    assert_eq!(source.channel, 1);
    assert_eq!(source.name.as_deref(), Some("Mic"));
    assert_eq!(source.rtp_enabled, Some(true));

    let pushed = timeout(Duration::from_secs(2), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(pushed.channel, 4);
    assert_eq!(pushed.rtp_enabled, Some(false));

    client.stop().await;
}

#[tokio::test]
async fn bulk_source_query_returns_every_channel() {
    let addr = mock_device(|stream| async move {
        let (read, mut write) = stream.into_split();
        let mut lines = BufReader::new(read).lines();
        let line = lines.next_line().await.unwrap().unwrap();
        assert_eq!(line, "SOURCE");
        write
            .write_all(
                b"SOURCE 1\nPSNM=Mic\nRTPE=1\n\nSOURCE 2\nPSNM=CD\nRTPE=0\n\nSOURCE 3\nPSNM=Aux\nRTPE=1\n\n",
            )
            .await
            .unwrap();
        while let Ok(Some(_)) = lines.next_line().await {}
    })
    .await;

    let client = connect(addr).await;
    let sources = client.source_data_all().await.unwrap();

    assert_eq!(sources.len(), 3);
    // wire order is preserved
    assert_eq!(sources[0].channel, 1);
    assert_eq!(sources[0].name.as_deref(), Some("Mic"));
    assert_eq!(sources[1].channel, 2);
    assert_eq!(sources[1].rtp_enabled, Some(false));
    assert_eq!(sources[2].channel, 3);

    // the burst also populated the cache
    let snap = client.session().snapshot(&Category::Source(2)).unwrap();
    assert_eq!(snap.get("PSNM"), Some("CD"));

    client.stop().await;
}

#[tokio::test]
async fn bulk_gpi_query_ignores_gpo_frames_on_the_shared_topic() {
    let addr = mock_device(|stream| async move {
        let (read, mut write) = stream.into_split();
        let mut lines = BufReader::new(read).lines();
        let line = lines.next_line().await.unwrap().unwrap();
        assert_eq!(line, "ADD GPI");
        // a GPO push lands mid-burst; it shares the GPIO topic but is not
        // part of the GPI table
        write
            .write_all(b"GPO 9\nPINS=lllll\n\nGPI 1\nPINS=hhhhh\n\nGPI 2\nPINS=hhlhh\n\n")
            .await
            .unwrap();
        while let Ok(Some(_)) = lines.next_line().await {}
    })
    .await;

    let client = connect(addr).await;
    let gpis = client.gpi_data_all().await.unwrap();

    assert_eq!(gpis.len(), 2);
    assert_eq!(gpis[0].channel, 1);
    assert_eq!(gpis[1].channel, 2);

    client.stop().await;
}

#[tokio::test]
async fn bulk_query_times_out_when_the_device_stays_silent() {
    let addr = mock_device(|stream| async move {
        let (read, _write) = stream.into_split();
        let mut lines = BufReader::new(read).lines();
        while let Ok(Some(_)) = lines.next_line().await {}
    })
    .await;

    let client = LwrpClient::connect_with(
        addr.ip().to_string(),
        SessionConfig {
            port: addr.port(),
            command_timeout: Duration::from_millis(300),
        },
    )
    .await
    .unwrap();

    let err = client.destination_data_all().await.unwrap_err();
    assert!(matches!(err, lwrp_client::LwrpError::Timeout { .. }));

    client.stop().await;
}

// Session is kept alive by the client clone; make sure that is reflected in
// the public type
#[tokio::test]
async fn client_clones_share_the_session() {
    let addr = mock_device(|stream| async move {
        let (read, _write) = stream.into_split();
        let mut lines = BufReader::new(read).lines();
        while let Ok(Some(_)) = lines.next_line().await {}
    })
    .await;

    let client = connect(addr).await;
    let other = client.clone();
    assert!(Arc::ptr_eq(client.session(), other.session()));
    client.stop().await;
}
