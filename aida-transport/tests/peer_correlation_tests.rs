// Correlation behavior of a peer against a hand-driven remote end:
// out-of-order responses, deadlines and late responses.

use aida_core::{Digest, ErrorCode, FieldBuffer, Frame, MessageKind, ObjectId};
use aida_transport::{memory_pair, Peer, PeerConfig, RpcTransport, StreamTransport};
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};

const ECHO: Digest = Digest::new(0xec40, 0x0001);

fn request(value: i64) -> Frame {
    let mut frame = Frame::request(MessageKind::TwoWayCall, ObjectId::new(1), ECHO);
    frame.payload_mut().push_int(value);
    frame
}

fn answer(request: &Frame, value: i64) -> Frame {
    let mut payload = FieldBuffer::new();
    payload.push_int(value);
    Frame::result_for(request.header(), payload)
}

#[cfg(test)]
mod correlation_tests {
    use super::*;

    #[tokio::test]
    async fn test_reversed_responses_reach_their_own_callers() {
        let (local, mut remote) = memory_pair();
        let (peer, _inbound) = Peer::start(local, PeerConfig::default());

        let first = tokio::spawn({
            let peer = peer.clone();
            async move { peer.call(request(10), Duration::from_secs(5)).await }
        });
        let req_a = remote.recv().await.unwrap().unwrap();
        let second = tokio::spawn({
            let peer = peer.clone();
            async move { peer.call(request(20), Duration::from_secs(5)).await }
        });
        let req_b = remote.recv().await.unwrap().unwrap();

        assert_eq!(req_a.digest(), req_b.digest());
        assert_ne!(req_a.call_id(), req_b.call_id());

        // answer in reverse order, echoing each request's argument
        let b_arg = req_b.args().pop_int().unwrap();
        let a_arg = req_a.args().pop_int().unwrap();
        remote.send(answer(&req_b, b_arg)).await.unwrap();
        remote.send(answer(&req_a, a_arg)).await.unwrap();

        let first = first.await.unwrap().unwrap().into_result().unwrap();
        let second = second.await.unwrap().unwrap().into_result().unwrap();
        assert_eq!(first.reader().pop_int().unwrap(), 10);
        assert_eq!(second.reader().pop_int().unwrap(), 20);
        assert_eq!(peer.pending_calls(), 0);
    }

    #[tokio::test]
    async fn test_timeout_then_late_response_is_discarded() {
        let (local, mut remote) = memory_pair();
        let (peer, _inbound) = Peer::start(local, PeerConfig::default());

        let err = peer
            .call(request(1), Duration::from_millis(50))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::Timeout);
        assert_eq!(peer.pending_calls(), 0);

        let stale = remote.recv().await.unwrap().unwrap();
        remote.send(answer(&stale, 1)).await.unwrap();

        let next = tokio::spawn({
            let peer = peer.clone();
            async move { peer.call(request(2), Duration::from_secs(5)).await }
        });
        let fresh = remote.recv().await.unwrap().unwrap();
        assert_ne!(fresh.call_id(), stale.call_id());
        remote.send(answer(&fresh, 2)).await.unwrap();

        let payload = next.await.unwrap().unwrap().into_result().unwrap();
        assert_eq!(payload.reader().pop_int().unwrap(), 2);
        assert_eq!(peer.pending_calls(), 0);
    }

    #[tokio::test]
    async fn test_error_frame_is_a_typed_failure() {
        let (local, mut remote) = memory_pair();
        let (peer, _inbound) = Peer::start(local, PeerConfig::default());

        let call = tokio::spawn({
            let peer = peer.clone();
            async move { peer.call(request(1), Duration::from_secs(5)).await }
        });
        let req = remote.recv().await.unwrap().unwrap();
        let failure = aida_core::RpcError::remote("Canvas", "out of ink");
        remote.send(Frame::error_for(req.header(), &failure)).await.unwrap();

        let err = call.await.unwrap().unwrap().into_result().unwrap_err();
        assert_eq!(err.code, ErrorCode::Remote);
        assert_eq!(err.domain.as_deref(), Some("Canvas"));
        assert_eq!(err.message, "out of ink");
    }
}

#[cfg(test)]
mod tcp_tests {
    use super::*;

    #[tokio::test]
    async fn test_peers_over_tcp() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let (peer, mut inbound) = Peer::start(StreamTransport::new(socket), PeerConfig::default());
            while let Some(frame) = inbound.recv().await {
                let value = frame.args().pop_int().unwrap();
                peer.send(answer(&frame, value * 2)).await.unwrap();
            }
        });

        let socket = TcpStream::connect(addr).await.unwrap();
        let (client, _inbound) = Peer::start(StreamTransport::new(socket), PeerConfig::default());
        for value in [1, 2, 3] {
            let result = client
                .call(request(value), Duration::from_secs(5))
                .await
                .unwrap()
                .into_result()
                .unwrap();
            assert_eq!(result.reader().pop_int().unwrap(), value * 2);
        }

        client.close().await;
        server.await.unwrap();
    }
}
