// Integration tests for broadcast delivery against a local mock push service

#[cfg(test)]
mod delivery_integration_tests {
    use axum::body::Bytes;
    use axum::extract::{Path, State};
    use axum::http::header::{HeaderName, LOCATION};
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use axum::Router;
    use p256::ecdsa::signature::Verifier;
    use p256::ecdsa::{Signature, VerifyingKey};
    use p256::SecretKey;
    use rand::rngs::OsRng;
    use std::net::SocketAddr;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use webpush_server_lib::push::encryption::{decrypt, EncryptedPayload};
    use webpush_server_lib::push::keys::{decode_base64url, encode_base64url, encode_public_key};
    use webpush_server_lib::push::{
        DeliveryCoordinator, DeliveryOptions, Notification, PushService, ServerIdentity,
        SubscriberRegistry, Subscription,
    };

    #[derive(Debug, Clone)]
    struct RecordedRequest {
        path: String,
        headers: HeaderMap,
        body: Vec<u8>,
    }

    #[derive(Clone, Default)]
    struct MockPushService {
        requests: Arc<Mutex<Vec<RecordedRequest>>>,
    }

    impl MockPushService {
        fn requests(&self) -> Vec<RecordedRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    /// Answers with the status code embedded in the path
    async fn push_handler(
        State(mock): State<MockPushService>,
        Path((status, id)): Path<(u16, String)>,
        headers: HeaderMap,
        body: Bytes,
    ) -> StatusCode {
        mock.requests.lock().unwrap().push(RecordedRequest {
            path: format!("/push/{}/{}", status, id),
            headers,
            body: body.to_vec(),
        });
        StatusCode::from_u16(status).unwrap()
    }

    async fn slow_handler() -> StatusCode {
        tokio::time::sleep(Duration::from_secs(5)).await;
        StatusCode::CREATED
    }

    /// Answers 410 after a delay; only recorded once the answer is ready
    async fn slow_gone_handler(
        State(mock): State<MockPushService>,
        headers: HeaderMap,
        body: Bytes,
    ) -> StatusCode {
        tokio::time::sleep(Duration::from_millis(300)).await;
        mock.requests.lock().unwrap().push(RecordedRequest {
            path: "/slow-gone".to_string(),
            headers,
            body: body.to_vec(),
        });
        StatusCode::GONE
    }

    async fn redirect_handler() -> (StatusCode, [(HeaderName, &'static str); 1]) {
        (StatusCode::FOUND, [(LOCATION, "/push/201/redirected")])
    }

    async fn start_mock_push_service() -> (SocketAddr, MockPushService) {
        let mock = MockPushService::default();
        let app = Router::new()
            .route("/push/:status/:id", post(push_handler))
            .route("/slow", post(slow_handler))
            .route("/slow-gone", post(slow_gone_handler))
            .route("/redirect", post(redirect_handler))
            .with_state(mock.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (addr, mock)
    }

    struct TestSubscriber {
        secret: SecretKey,
        auth: [u8; 16],
        subscription: Subscription,
    }

    fn create_test_subscriber(endpoint: String) -> TestSubscriber {
        let secret = SecretKey::random(&mut OsRng);
        let auth = [7u8; 16];
        let subscription = Subscription::new(
            endpoint,
            encode_public_key(&secret.public_key()).to_base64url(),
            encode_base64url(&auth),
        );
        TestSubscriber {
            secret,
            auth,
            subscription,
        }
    }

    fn create_test_service() -> (PushService, Arc<ServerIdentity>) {
        let identity = Arc::new(ServerIdentity::from_secret_key(SecretKey::random(&mut OsRng)));
        let options = DeliveryOptions {
            request_timeout: Duration::from_secs(1),
            max_concurrency: 4,
            ..Default::default()
        };
        let coordinator = DeliveryCoordinator::new(identity.clone(), options).unwrap();
        let service = PushService::new(Arc::new(SubscriberRegistry::new()), coordinator);
        (service, identity)
    }

    fn parse_authorization(value: &str) -> (String, String) {
        let rest = value.strip_prefix("vapid t=").expect("vapid scheme");
        let (token, key) = rest.split_once(", k=").expect("k parameter");
        (token.to_string(), key.to_string())
    }

    #[tokio::test]
    async fn test_broadcast_end_to_end() {
        let (addr, mock) = start_mock_push_service().await;
        let (service, identity) = create_test_service();
        let subscriber = create_test_subscriber(format!("http://{}/push/201/a", addr));
        service.register_subscription(subscriber.subscription.clone());

        let report = service
            .broadcast(&Notification::new("T", "B"))
            .await
            .unwrap();
        assert_eq!(report.delivered, 1);

        let requests = mock.requests();
        assert_eq!(requests.len(), 1);
        let request = &requests[0];

        // Body decrypts back to the notification JSON
        let payload = EncryptedPayload::parse(&request.body).unwrap();
        let plaintext = decrypt(&payload, &subscriber.secret, &subscriber.auth).unwrap();
        assert_eq!(plaintext, br#"{"title":"T","body":"B"}"#);

        // Required headers
        assert_eq!(request.headers["content-encoding"], "aes128gcm");
        assert_eq!(request.headers["content-type"], "application/octet-stream");
        assert_eq!(request.headers["ttl"], "180");

        // VAPID authorization for the mock's origin
        let authorization = request.headers["authorization"].to_str().unwrap();
        let (token, key) = parse_authorization(authorization);
        assert_eq!(key, identity.public_key_base64());

        let parts: Vec<&str> = token.split('.').collect();
        assert_eq!(parts.len(), 3);
        let claims: serde_json::Value =
            serde_json::from_slice(&decode_base64url(parts[1]).unwrap()).unwrap();
        assert_eq!(claims["aud"], format!("http://{}", addr));
        assert_eq!(claims["sub"], "mailto:example@example.com");

        let signature = Signature::from_slice(&decode_base64url(parts[2]).unwrap()).unwrap();
        VerifyingKey::from(identity.signing_key())
            .verify(format!("{}.{}", parts[0], parts[1]).as_bytes(), &signature)
            .unwrap();
    }

    #[tokio::test]
    async fn test_status_codes_drive_removal() {
        let (addr, mock) = start_mock_push_service().await;
        let (service, _) = create_test_service();

        for status in [201, 404, 410, 429, 500] {
            let subscriber = create_test_subscriber(format!("http://{}/push/{}/x", addr, status));
            service.register_subscription(subscriber.subscription);
        }

        let report = service
            .broadcast(&Notification::new("T", "B"))
            .await
            .unwrap();

        assert_eq!(mock.requests().len(), 5);
        assert_eq!(report.delivered, 1);
        assert_eq!(report.removed, 2);
        assert_eq!(report.transient, 2);

        assert!(service.is_subscribed(&format!("http://{}/push/201/x", addr)));
        assert!(!service.is_subscribed(&format!("http://{}/push/404/x", addr)));
        assert!(!service.is_subscribed(&format!("http://{}/push/410/x", addr)));
        assert!(service.is_subscribed(&format!("http://{}/push/429/x", addr)));
        assert!(service.is_subscribed(&format!("http://{}/push/500/x", addr)));
    }

    #[tokio::test]
    async fn test_malformed_subscriber_does_not_block_others() {
        let (addr, mock) = start_mock_push_service().await;
        let (service, _) = create_test_service();

        let first = create_test_subscriber(format!("http://{}/push/201/first", addr));
        let second = create_test_subscriber(format!("http://{}/push/201/second", addr));
        let malformed_endpoint = format!("http://{}/push/201/malformed", addr);
        service.register_subscription(first.subscription);
        service.register_subscription(second.subscription);
        service.register_subscription(Subscription::new(
            malformed_endpoint.clone(),
            "not-a-key",
            encode_base64url(&[1u8; 16]),
        ));

        let report = service
            .broadcast(&Notification::new("T", "B"))
            .await
            .unwrap();

        assert_eq!(report.delivered, 2);
        assert_eq!(report.failed_encryption, 1);
        assert_eq!(report.removed, 0);

        let mut paths: Vec<String> = mock.requests().into_iter().map(|r| r.path).collect();
        paths.sort();
        assert_eq!(paths, vec!["/push/201/first", "/push/201/second"]);
        assert!(service.is_subscribed(&malformed_endpoint));
    }

    #[tokio::test]
    async fn test_timeout_is_transient() {
        let (addr, _mock) = start_mock_push_service().await;
        let (service, _) = create_test_service();
        let endpoint = format!("http://{}/slow", addr);
        service.register_subscription(create_test_subscriber(endpoint.clone()).subscription);

        let report = service
            .broadcast(&Notification::new("T", "B"))
            .await
            .unwrap();

        assert_eq!(report.transient, 1);
        assert_eq!(report.removed, 0);
        assert!(service.is_subscribed(&endpoint));
    }

    #[tokio::test]
    async fn test_unreachable_push_service_is_transient() {
        // Bind and drop to get a port nothing listens on
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let (service, _) = create_test_service();
        let endpoint = format!("http://{}/push/201/x", addr);
        service.register_subscription(create_test_subscriber(endpoint.clone()).subscription);

        let report = service
            .broadcast(&Notification::new("T", "B"))
            .await
            .unwrap();

        assert_eq!(report.transient, 1);
        assert!(service.is_subscribed(&endpoint));
    }

    #[tokio::test]
    async fn test_many_subscribers_with_bounded_pool() {
        let (addr, mock) = start_mock_push_service().await;
        let (service, _) = create_test_service();

        for i in 0..20 {
            let subscriber = create_test_subscriber(format!("http://{}/push/201/{}", addr, i));
            service.register_subscription(subscriber.subscription);
        }

        let report = service
            .broadcast(&Notification::new("T", "B"))
            .await
            .unwrap();

        assert_eq!(report.delivered, 20);
        assert_eq!(mock.requests().len(), 20);
        assert_eq!(service.subscriber_count(), 20);
    }

    #[tokio::test]
    async fn test_send_to_single_subscriber() {
        let (addr, mock) = start_mock_push_service().await;
        let (service, _) = create_test_service();
        let gone = format!("http://{}/push/410/gone", addr);
        let kept = format!("http://{}/push/201/kept", addr);
        service.register_subscription(create_test_subscriber(gone.clone()).subscription);
        service.register_subscription(create_test_subscriber(kept.clone()).subscription);

        assert!(service
            .send_to(&kept, &Notification::new("T", "B"))
            .await
            .unwrap());
        assert_eq!(mock.requests().len(), 1);

        let result = service.send_to(&gone, &Notification::new("T", "B")).await;
        assert!(result.unwrap_err().is_permanent_subscription_failure());
        assert!(!service.is_subscribed(&gone));
        assert!(service.is_subscribed(&kept));

        assert!(!service
            .send_to("http://127.0.0.1:1/unknown", &Notification::new("T", "B"))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_padding_target_is_applied() {
        let (addr, mock) = start_mock_push_service().await;
        let identity = Arc::new(ServerIdentity::from_secret_key(SecretKey::random(&mut OsRng)));
        let options = DeliveryOptions {
            padding_target: 256,
            ..Default::default()
        };
        let coordinator = DeliveryCoordinator::new(identity, options).unwrap();
        let registry = Arc::new(SubscriberRegistry::new());
        let subscriber = create_test_subscriber(format!("http://{}/push/201/pad", addr));
        registry.register(subscriber.subscription.clone());

        coordinator
            .send_to_all(&Notification::new("T", "B"), &registry)
            .await
            .unwrap();

        let body = &mock.requests()[0].body;
        let payload = EncryptedPayload::parse(body).unwrap();
        // Plaintext padded to 256 bytes, the delimiter, then the tag
        assert_eq!(payload.ciphertext.len(), 256 + 1 + 16);
        let plaintext = decrypt(&payload, &subscriber.secret, &subscriber.auth).unwrap();
        assert_eq!(plaintext, br#"{"title":"T","body":"B"}"#);
    }

    #[tokio::test]
    async fn test_cancelled_broadcast_still_finishes_deliveries() {
        let (addr, mock) = start_mock_push_service().await;
        let (service, _) = create_test_service();
        let endpoint = format!("http://{}/slow-gone", addr);
        service.register_subscription(create_test_subscriber(endpoint.clone()).subscription);

        // Drop the broadcast while the push service is still answering
        let cancelled = tokio::time::timeout(
            Duration::from_millis(100),
            service.broadcast(&Notification::new("T", "B")),
        )
        .await;
        assert!(cancelled.is_err());

        tokio::time::sleep(Duration::from_secs(1)).await;

        assert_eq!(mock.requests().len(), 1);
        assert!(!service.is_subscribed(&endpoint));
    }

    #[tokio::test]
    async fn test_redirect_is_not_followed() {
        let (addr, mock) = start_mock_push_service().await;
        let (service, _) = create_test_service();
        let endpoint = format!("http://{}/redirect", addr);
        service.register_subscription(create_test_subscriber(endpoint.clone()).subscription);

        let report = service
            .broadcast(&Notification::new("T", "B"))
            .await
            .unwrap();

        assert_eq!(report.transient, 1);
        assert_eq!(report.delivered, 0);
        assert!(mock.requests().is_empty());
        assert!(service.is_subscribed(&endpoint));
    }

    #[tokio::test]
    async fn test_re_registration_during_pass_is_kept() {
        let (addr, mock) = start_mock_push_service().await;
        let (service, _) = create_test_service();
        let endpoint = format!("http://{}/slow-gone", addr);
        service.register_subscription(create_test_subscriber(endpoint.clone()).subscription);

        let renewed = create_test_subscriber(endpoint.clone()).subscription;
        let notification = Notification::new("T", "B");
        let (report, _) = tokio::join!(service.broadcast(&notification), async {
            // Browser renews its keys while the old ones are being rejected
            tokio::time::sleep(Duration::from_millis(100)).await;
            service.register_subscription(renewed.clone());
        });
        let report = report.unwrap();

        assert_eq!(mock.requests().len(), 1);
        assert_eq!(report.invalid, 1);
        assert_eq!(report.removed, 0);
        assert!(service.is_subscribed(&endpoint));
    }
}
