//! Datagram connection with reliable transmission of Confirmable messages.
//!
//! [`Connection`] couples a [`PacketEndpoint`] with a single-owner event
//! loop that tracks in-flight Confirmable messages. The read path routes
//! ACK/RST message ids to the loop through a bounded channel; the write
//! path registers Confirmable sends the same way. Each direction of the
//! socket is serialized by its own mutex so reads never block writes.

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::BytesMut;
use log::{debug, warn};
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::time::Instant;

use crate::error::ConnectionError;
use crate::message::header::MessageType;
use crate::message::packet::{DecodeOptions, Packet};
use crate::retransmit::{RetransmitOptions, RetransmitQueue, TransmitEntry};
use crate::transport::PacketEndpoint;

/// Options for creating a [`Connection`].
#[derive(Debug, Clone, Default)]
pub struct ConnectionOptions {
    pub retransmit: RetransmitOptions,
    pub decode: DecodeOptions,
}

/// Mutex-serialized decoding reader over a packet endpoint.
///
/// Owns one reusable receive buffer sized to the maximum message length.
pub struct Reader {
    endpoint: Arc<dyn PacketEndpoint>,
    opts: DecodeOptions,
    buf: Mutex<BytesMut>,
}

impl Reader {
    pub fn new(endpoint: Arc<dyn PacketEndpoint>, opts: DecodeOptions) -> Reader {
        let mut buf = BytesMut::with_capacity(opts.max_message_length);
        buf.resize(opts.max_message_length, 0);

        Reader {
            endpoint,
            opts,
            buf: Mutex::new(buf),
        }
    }

    /// Receives and decodes one message, returning it with the peer
    /// address.
    ///
    /// A datagram that fails to decode is reported as
    /// [`ConnectionError::Decode`] carrying the peer address.
    pub async fn read(&self) -> Result<(Packet, SocketAddr), ConnectionError> {
        let mut buf = self.buf.lock().await;

        let (n, peer) = self.endpoint.recv_from(&mut buf).await?;
        let packet = Packet::from_bytes(&buf[..n], &self.opts)
            .map_err(|cause| ConnectionError::Decode { peer, cause })?;

        Ok((packet, peer))
    }
}

/// Mutex-serialized encoding writer over a packet endpoint.
///
/// Owns one reusable send buffer.
pub struct Writer {
    endpoint: Arc<dyn PacketEndpoint>,
    buf: Mutex<Vec<u8>>,
}

impl Writer {
    pub fn new(endpoint: Arc<dyn PacketEndpoint>) -> Writer {
        Writer {
            endpoint,
            buf: Mutex::new(Vec::new()),
        }
    }

    /// Encodes and sends one message to `peer`.
    pub async fn write(&self, message: &Packet, peer: SocketAddr) -> Result<(), ConnectionError> {
        let mut buf = self.buf.lock().await;

        buf.clear();
        message.encode(&mut buf)?;
        self.endpoint.send_to(&buf, peer).await?;

        Ok(())
    }
}

/// A CoAP connection over a packet endpoint with retransmission of
/// Confirmable messages.
///
/// Must be created inside a tokio runtime; the retransmission loop runs as
/// its own task until [`Connection::close`] is called or the connection is
/// dropped.
pub struct Connection {
    endpoint: Arc<dyn PacketEndpoint>,
    reader: Reader,
    writer: Arc<Writer>,
    retransmit: RetransmitOptions,

    closed: AtomicBool,
    close_tx: watch::Sender<bool>,
    add_tx: mpsc::Sender<TransmitEntry>,
    remove_tx: mpsc::Sender<u16>,
}

impl Connection {
    /// Binds a UDP socket on `addr` and wraps it in a connection with
    /// default options.
    pub async fn bind<A: tokio::net::ToSocketAddrs>(addr: A) -> io::Result<Connection> {
        let socket = UdpSocket::bind(addr).await?;

        Ok(Connection::new(socket, ConnectionOptions::default()))
    }

    /// Wraps a packet endpoint in a connection and spawns its event loop.
    pub fn new(endpoint: impl PacketEndpoint + 'static, opts: ConnectionOptions) -> Connection {
        let endpoint: Arc<dyn PacketEndpoint> = Arc::new(endpoint);
        let reader = Reader::new(endpoint.clone(), opts.decode.clone());
        let writer = Arc::new(Writer::new(endpoint.clone()));

        let (close_tx, close_rx) = watch::channel(false);
        let (add_tx, add_rx) = mpsc::channel(1);
        let (remove_tx, remove_rx) = mpsc::channel(1);

        tokio::spawn(run(
            writer.clone(),
            opts.retransmit.clone(),
            add_rx,
            remove_rx,
            close_rx,
        ));

        Connection {
            endpoint,
            reader,
            writer,
            retransmit: opts.retransmit,
            closed: AtomicBool::new(false),
            close_tx,
            add_tx,
            remove_tx,
        }
    }

    /// The local address of the underlying endpoint.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.endpoint.local_addr()
    }

    /// Closes the connection: unblocks pending reads and writes with
    /// [`ConnectionError::Closed`], and drains in-flight entries through
    /// the error handler. Idempotent.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            let _ = self.close_tx.send(true);
        }
    }

    /// Reads one message, returning it with the peer address.
    ///
    /// Received Acknowledgement and Reset message ids are routed to the
    /// event loop to cancel the matching in-flight entry before this call
    /// returns.
    pub async fn read(&self) -> Result<(Packet, SocketAddr), ConnectionError> {
        let mut close_rx = self.close_tx.subscribe();
        if self.closed.load(Ordering::SeqCst) {
            return Err(ConnectionError::Closed);
        }

        let (packet, peer) = tokio::select! {
            _ = close_rx.changed() => return Err(ConnectionError::Closed),
            result = self.reader.read() => result?,
        };

        let message_type = packet.header.message_type;
        if message_type == MessageType::Acknowledgement || message_type == MessageType::Reset {
            tokio::select! {
                _ = close_rx.changed() => return Err(ConnectionError::Closed),
                sent = self.remove_tx.send(packet.header.message_id) => {
                    if sent.is_err() {
                        return Err(ConnectionError::Closed);
                    }
                }
            }
        }

        Ok((packet, peer))
    }

    /// Sends one message to `peer`.
    ///
    /// Confirmable messages are registered with the event loop for
    /// retransmission after the bytes are on the wire; terminal
    /// retransmission errors are reported through the configured error
    /// handler.
    pub async fn write(&self, message: &Packet, peer: SocketAddr) -> Result<(), ConnectionError> {
        let mut close_rx = self.close_tx.subscribe();
        if self.closed.load(Ordering::SeqCst) {
            return Err(ConnectionError::Closed);
        }

        tokio::select! {
            _ = close_rx.changed() => return Err(ConnectionError::Closed),
            result = self.writer.write(message, peer) => result?,
        }

        if message.header.message_type != MessageType::Confirmable {
            return Ok(());
        }

        let timeout = self.retransmit.initial_timeout();
        let entry = TransmitEntry::new(message.clone(), peer, Instant::now(), timeout);

        tokio::select! {
            _ = close_rx.changed() => Err(ConnectionError::Closed),
            sent = self.add_tx.send(entry) => sent.map_err(|_| ConnectionError::Closed),
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.close();
    }
}

/// Single-owner event loop: exclusive owner of the retransmit queue.
///
/// Waits on close, add, remove and the timer; the timer is a one-shot
/// re-armed after every turn to the queue's next deadline.
async fn run(
    writer: Arc<Writer>,
    opts: RetransmitOptions,
    mut add_rx: mpsc::Receiver<TransmitEntry>,
    mut remove_rx: mpsc::Receiver<u16>,
    mut close_rx: watch::Receiver<bool>,
) {
    let handler = opts.error_handler.clone();
    let mut queue = RetransmitQueue::new(opts);
    let mut due = Vec::new();

    let timer = tokio::time::sleep(queue.next_deadline(Instant::now()));
    tokio::pin!(timer);

    loop {
        tokio::select! {
            _ = close_rx.changed() => {
                queue.close();
                return;
            }
            Some(entry) = add_rx.recv() => {
                queue.add(entry);
            }
            Some(id) = remove_rx.recv() => {
                if queue.remove(id).is_some() {
                    debug!("acknowledged message {id}");
                }
            }
            _ = timer.as_mut() => {
                let now = Instant::now();
                queue.retransmit(now, &mut due);

                for entry in &due {
                    debug!(
                        "retransmit message {} to {}, attempt {}",
                        entry.message.header.message_id, entry.peer, entry.retransmits
                    );

                    if let Err(err) = writer.write(&entry.message, entry.peer).await {
                        warn!(
                            "retransmit of message {} failed: {err}",
                            entry.message.header.message_id
                        );
                        (*handler)(&entry.message, err);
                    }
                }
            }
        }

        let now = Instant::now();
        timer.as_mut().reset(now + queue.next_deadline(now));
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::error::MessageError;
    use crate::message::header::{MessageClass, RequestType, ResponseType};
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;
    use tokio::time::timeout;

    fn confirmable(id: u16) -> Packet {
        let mut packet = Packet::new();
        packet.header.message_type = MessageType::Confirmable;
        packet.header.code = MessageClass::Request(RequestType::Get);
        packet.header.message_id = id;
        packet
    }

    fn ack(id: u16) -> Packet {
        let mut packet = Packet::new();
        packet.header.message_type = MessageType::Acknowledgement;
        packet.header.code = MessageClass::Response(ResponseType::Content);
        packet.header.message_id = id;
        packet
    }

    fn fast_options(
        ack_timeout: Duration,
        max_retransmit: u32,
    ) -> (ConnectionOptions, Arc<StdMutex<Vec<String>>>) {
        let errors = Arc::new(StdMutex::new(Vec::new()));
        let sink = errors.clone();
        let opts = ConnectionOptions {
            retransmit: RetransmitOptions {
                ack_timeout,
                ack_random_factor: 0.0,
                max_retransmit,
                error_handler: Arc::new(move |_, err| {
                    sink.lock().unwrap().push(err.to_string());
                }),
                ..RetransmitOptions::default()
            },
            ..ConnectionOptions::default()
        };

        (opts, errors)
    }

    async fn bind_pair() -> (Connection, Connection) {
        let a = Connection::bind("127.0.0.1:0").await.unwrap();
        let b = Connection::bind("127.0.0.1:0").await.unwrap();

        (a, b)
    }

    #[tokio::test]
    async fn test_read_write_roundtrip() {
        let (a, b) = bind_pair().await;
        let b_addr = b.local_addr().unwrap();

        let mut message = Packet::new();
        message.header.message_type = MessageType::NonConfirmable;
        message.header.message_id = 42;
        message.payload = b"hello".to_vec();

        a.write(&message, b_addr).await.unwrap();

        let (received, peer) = timeout(Duration::from_secs(1), b.read())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(received, message);
        assert_eq!(peer, a.local_addr().unwrap());
    }

    #[tokio::test]
    async fn test_ack_cancels_retransmit() {
        let (opts, errors) = fast_options(Duration::from_millis(100), 4);
        let a = Connection::new(
            UdpSocket::bind("127.0.0.1:0").await.unwrap(),
            opts,
        );
        let b = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let b_addr = PacketEndpoint::local_addr(&b).unwrap();

        a.write(&confirmable(7), b_addr).await.unwrap();

        // first transmission arrives at b
        let mut buf = [0u8; 1500];
        let (n, a_addr) = timeout(Duration::from_secs(1), b.recv_from(&mut buf))
            .await
            .unwrap()
            .unwrap();
        assert!(n >= 4);

        // acknowledge and route the ACK through a's read path
        b.send_to(&ack(7).to_bytes().unwrap(), a_addr).await.unwrap();
        let (received, _) = timeout(Duration::from_secs(1), a.read())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            received.header.message_type,
            MessageType::Acknowledgement
        );

        // no retransmission reaches b after the cancel
        let quiet = timeout(Duration::from_millis(400), b.recv_from(&mut buf)).await;
        assert!(quiet.is_err(), "unexpected retransmission after ACK");
        assert!(errors.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_retransmits_until_retry_limit() {
        let (opts, errors) = fast_options(Duration::from_millis(20), 2);
        let a = Connection::new(
            UdpSocket::bind("127.0.0.1:0").await.unwrap(),
            opts,
        );
        let b = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let b_addr = PacketEndpoint::local_addr(&b).unwrap();

        a.write(&confirmable(9), b_addr).await.unwrap();

        // initial transmission plus two retransmits, then the entry dies
        let mut buf = [0u8; 1500];
        let mut received = 0;
        while timeout(Duration::from_millis(500), b.recv_from(&mut buf))
            .await
            .is_ok()
        {
            received += 1;
        }
        assert_eq!(received, 3);

        let errors = errors.lock().unwrap();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("retry limit"), "got {:?}", errors[0]);
    }

    #[tokio::test]
    async fn test_close_fails_pending_and_future_calls() {
        let (opts, errors) = fast_options(Duration::from_secs(60), 4);
        let a = Connection::new(
            UdpSocket::bind("127.0.0.1:0").await.unwrap(),
            opts,
        );
        let peer = "127.0.0.1:5683".parse().unwrap();

        // park an in-flight Confirmable entry, then close underneath it
        a.write(&confirmable(5), peer).await.unwrap();

        let closer = a.close_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            let _ = closer.send(true);
        });

        let err = a.read().await.unwrap_err();
        assert!(matches!(err, ConnectionError::Closed));

        a.close();
        assert!(matches!(a.read().await, Err(ConnectionError::Closed)));
        assert!(matches!(
            a.write(&confirmable(6), peer).await,
            Err(ConnectionError::Closed)
        ));

        // the in-flight entry was drained through the error handler
        tokio::time::sleep(Duration::from_millis(50)).await;
        let errors = errors.lock().unwrap();
        assert_eq!(*errors, ["connection closed"]);
    }

    #[tokio::test]
    async fn test_read_reports_decode_error_with_peer() {
        let (a, _b) = bind_pair().await;
        let a_addr = a.local_addr().unwrap();

        let garbage = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        garbage.send_to(&[0x84, 0x45, 0x13], a_addr).await.unwrap();

        let err = timeout(Duration::from_secs(1), a.read())
            .await
            .unwrap()
            .unwrap_err();
        match err {
            ConnectionError::Decode { peer, cause } => {
                assert_eq!(peer, PacketEndpoint::local_addr(&garbage).unwrap());
                assert_eq!(cause, MessageError::Truncated { expected: 4 }.at_offset(0));
            }
            other => panic!("expected decode error, got {other}"),
        }
    }
}
