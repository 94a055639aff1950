// hub-test-utils: shared test utilities for the relay hub suite.
//
// Provides a mock WebSocket client and a minimal echo peer for integration
// testing the server and the signed client without standing up either one's
// full dependency stack.

pub mod mock_ws_client;
pub mod mock_ws_server;

pub use mock_ws_client::MockWsClient;
pub use mock_ws_server::MockHubServer;

#[cfg(test)]
mod tests {
    use super::*;
    use hub_protocol::Frame;

    #[tokio::test]
    async fn mock_server_starts_and_reports_port() {
        let server = MockHubServer::start().await.unwrap();
        assert_ne!(server.local_addr().port(), 0, "should bind to a real port");
    }

    #[tokio::test]
    async fn mock_client_send_recv_roundtrip_echoes_frame() {
        let server = MockHubServer::start().await.unwrap();
        let url = format!("ws://{}", server.local_addr());
        let mut client = MockWsClient::connect(&url).await.unwrap();

        let frame = Frame {
            id: 0,
            from: "alice".to_owned(),
            to: "bob".to_owned(),
            timestamp: "2026-01-01T00:00:00Z".to_owned(),
            content: "hi".to_owned(),
            status: "pending".to_owned(),
            is_broadcast: false,
            signature: None,
            is_forward_message: false,
        };
        client.send_frame(&frame).await.unwrap();
        let echoed = client.recv_frame().await.unwrap();
        assert_eq!(echoed, frame);
    }

    #[tokio::test]
    async fn mock_server_can_be_configured_to_refuse_initial_connections() {
        let server = MockHubServer::start_with_refusals(1).await.unwrap();
        let url = format!("ws://{}", server.local_addr());

        // First connection attempt should be refused (TCP accepted then dropped
        // before the WS handshake completes).
        let first = MockWsClient::connect(&url).await;
        assert!(first.is_err(), "first attempt should be refused");

        // A subsequent attempt should succeed once the refusal budget is spent.
        let mut client = MockWsClient::connect(&url)
            .await
            .expect("second attempt should connect");
        let frame = Frame {
            id: 0,
            from: "a".to_owned(),
            to: "b".to_owned(),
            timestamp: "2026-01-01T00:00:00Z".to_owned(),
            content: "ping".to_owned(),
            status: "pending".to_owned(),
            is_broadcast: false,
            signature: None,
            is_forward_message: false,
        };
        client.send_frame(&frame).await.unwrap();
        let echoed = client.recv_frame().await.unwrap();
        assert_eq!(echoed, frame);
    }
}
