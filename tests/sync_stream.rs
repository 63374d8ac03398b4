//! Synchronous connect, send and receive, and dormant demotion.

use socklane::addr::{Ipv4, SocketAddrV4};
use socklane::{Acceptor, ConnectionState, NetworkStackId, ReuseAddress, SocketError, StreamSocket};

fn listening_acceptor() -> (Acceptor<Ipv4>, SocketAddrV4) {
	let acceptor = Acceptor::<Ipv4>::new(None);
	acceptor.open(NetworkStackId::DEFAULT).unwrap();
	acceptor.set_option(&ReuseAddress(true)).unwrap();
	acceptor.bind(&SocketAddrV4::loopback(0)).unwrap();
	acceptor.listen().unwrap();
	let endpoint = acceptor.local_endpoint().unwrap();
	(acceptor, endpoint)
}

fn connected_pair() -> (StreamSocket<Ipv4>, StreamSocket<Ipv4>) {
	let (acceptor, endpoint) = listening_acceptor();
	let client = StreamSocket::<Ipv4>::new(None);
	client.open(NetworkStackId::DEFAULT).unwrap();
	client.connect(&endpoint).unwrap();
	let (server, _) = acceptor.accept(None).unwrap();
	(client, server)
}

#[test]
fn transfer_before_connect_rejected() {
	let socket = StreamSocket::<Ipv4>::new(None);
	socket.open(NetworkStackId::DEFAULT).unwrap();

	assert!(matches!(
		socket.send_sync(b"x"),
		Err(SocketError::ApiError(_))
	));
	let mut buf = [0u8; 4];
	assert!(matches!(
		socket.receive_sync(&mut buf),
		Err(SocketError::ApiError(_))
	));
}

#[test]
fn connect_twice_rejected() {
	let (client, _server) = connected_pair();
	let other = SocketAddrV4::loopback(1);
	assert!(matches!(
		client.connect(&other),
		Err(SocketError::ApiError(_))
	));
}

#[test]
fn send_and_receive_round_trip() {
	let (client, server) = connected_pair();

	assert_eq!(client.send_sync(&[0x41, 0x42]).unwrap(), 2);

	let mut buf = [0u8; 8];
	assert_eq!(server.receive_sync(&mut buf).unwrap(), 2);
	assert_eq!(&buf[..2], &[0x41, 0x42]);

	// the other direction works the same
	assert_eq!(server.send_sync(b"pong").unwrap(), 4);
	assert_eq!(client.receive_sync(&mut buf).unwrap(), 4);
	assert_eq!(&buf[..4], b"pong");
}

#[test]
fn empty_receive_buffer_is_a_no_op() {
	let (client, _server) = connected_pair();
	let mut buf = [0u8; 0];
	assert_eq!(client.receive_sync(&mut buf).unwrap(), 0);
	assert_eq!(client.connection_state(), ConnectionState::Connected);
}

#[test]
fn peer_close_demotes_to_dormant() {
	let (client, server) = connected_pair();

	server.close().unwrap();

	let mut buf = [0u8; 4];
	assert!(matches!(
		client.receive_sync(&mut buf),
		Err(SocketError::Disconnected)
	));
	assert_eq!(client.connection_state(), ConnectionState::Dormant);

	// dormant is a network condition, not a usage error
	assert!(matches!(
		client.send_sync(b"late"),
		Err(SocketError::Disconnected)
	));

	// close and reopen is the way back
	client.close().unwrap();
	client.open(NetworkStackId::DEFAULT).unwrap();
	assert_eq!(client.connection_state(), ConnectionState::Disconnected);
}

#[test]
fn remote_endpoint_reports_peer() {
	let (acceptor, endpoint) = listening_acceptor();
	let client = StreamSocket::<Ipv4>::new(None);
	client.open(NetworkStackId::DEFAULT).unwrap();
	client.connect(&endpoint).unwrap();
	let (_server, _) = acceptor.accept(None).unwrap();

	let peer = client.remote_endpoint().unwrap();
	assert_eq!(peer.ip(), [127, 0, 0, 1]);
	assert_eq!(peer.port(), endpoint.port());
}

#[test]
fn remote_endpoint_when_dormant_reports_disconnected() {
	let (client, server) = connected_pair();
	server.close().unwrap();

	let mut buf = [0u8; 4];
	assert!(matches!(
		client.receive_sync(&mut buf),
		Err(SocketError::Disconnected)
	));
	assert_eq!(client.connection_state(), ConnectionState::Dormant);

	// still a network condition here, not a usage error
	assert!(matches!(
		client.remote_endpoint(),
		Err(SocketError::Disconnected)
	));
}

#[test]
fn remote_endpoint_without_connection_rejected() {
	let socket = StreamSocket::<Ipv4>::new(None);
	socket.open(NetworkStackId::DEFAULT).unwrap();
	assert!(matches!(
		socket.remote_endpoint(),
		Err(SocketError::ApiError(_))
	));
}

#[test]
fn nonblocking_connect_polls_to_completion() {
	let (acceptor, endpoint) = listening_acceptor();

	let client = StreamSocket::<Ipv4>::new(None);
	client.open(NetworkStackId::DEFAULT).unwrap();
	client.set_blocking_mode(false).unwrap();

	match client.connect(&endpoint) {
		Ok(()) => {}
		Err(SocketError::Busy) => {
			assert_eq!(client.connection_state(), ConnectionState::ConnectingSync);
			// loopback handshakes settle quickly; poll until terminal
			let peer = loop {
				match client.remote_endpoint() {
					Ok(peer) => break peer,
					Err(SocketError::Busy) => std::thread::sleep(std::time::Duration::from_millis(5)),
					Err(e) => panic!("connect failed: {e}"),
				}
			};
			assert_eq!(peer.port(), endpoint.port());
		}
		Err(e) => panic!("connect failed: {e}"),
	}
	assert_eq!(client.connection_state(), ConnectionState::Connected);

	let (_server, _) = acceptor.accept(None).unwrap();
}
