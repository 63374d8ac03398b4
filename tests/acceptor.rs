//! Acceptor setup-sequence enforcement and synchronous accept.

use socklane::addr::{Ipv4, SocketAddrV4};
use socklane::{Acceptor, ConnectionState, NetworkStackId, ReuseAddress, SocketError, StreamSocket};

fn open_acceptor() -> Acceptor<Ipv4> {
	let acceptor = Acceptor::<Ipv4>::new(None);
	acceptor.open(NetworkStackId::DEFAULT).unwrap();
	acceptor.set_option(&ReuseAddress(true)).unwrap();
	acceptor
}

/// Binds an ephemeral loopback port and starts listening.
fn listening_acceptor() -> (Acceptor<Ipv4>, SocketAddrV4) {
	let acceptor = open_acceptor();
	acceptor.bind(&SocketAddrV4::loopback(0)).unwrap();
	acceptor.listen().unwrap();
	let endpoint = acceptor.local_endpoint().unwrap();
	assert_ne!(endpoint.port(), 0);
	(acceptor, endpoint)
}

#[test]
fn listen_before_bind_rejected() {
	let acceptor = open_acceptor();
	assert!(matches!(acceptor.listen(), Err(SocketError::ApiError(_))));
}

#[test]
fn accept_before_listen_rejected() {
	let acceptor = open_acceptor();
	assert!(matches!(acceptor.accept(None), Err(SocketError::ApiError(_))));

	acceptor.bind(&SocketAddrV4::loopback(0)).unwrap();
	// bound but not listening is still too early
	assert!(matches!(acceptor.accept(None), Err(SocketError::ApiError(_))));
}

#[test]
fn double_bind_rejected() {
	let acceptor = open_acceptor();
	acceptor.bind(&SocketAddrV4::loopback(0)).unwrap();
	assert!(matches!(
		acceptor.bind(&SocketAddrV4::loopback(0)),
		Err(SocketError::ApiError(_))
	));
}

#[test]
fn local_endpoint_reports_ephemeral_port() {
	let (_acceptor, endpoint) = listening_acceptor();
	assert_eq!(endpoint.ip(), [127, 0, 0, 1]);
	assert_ne!(endpoint.port(), 0);
}

#[test]
fn sync_accept_produces_connected_stream() {
	let (acceptor, endpoint) = listening_acceptor();

	// the connect completes against the listen queue before accept runs
	let client = StreamSocket::<Ipv4>::new(None);
	client.open(NetworkStackId::DEFAULT).unwrap();
	client.connect(&endpoint).unwrap();
	assert_eq!(client.connection_state(), ConnectionState::Connected);

	let (server, peer) = acceptor.accept(None).unwrap();
	assert_eq!(peer.ip(), [127, 0, 0, 1]);
	assert_eq!(server.connection_state(), ConnectionState::Connected);

	client.send_sync(b"ok").unwrap();
	let mut buf = [0u8; 4];
	assert_eq!(server.receive_sync(&mut buf).unwrap(), 2);
	assert_eq!(&buf[..2], b"ok");
}

#[test]
fn accept_after_close_rejected() {
	let (acceptor, _endpoint) = listening_acceptor();
	acceptor.close().unwrap();
	assert!(matches!(acceptor.accept(None), Err(SocketError::ApiError(_))));
}
