//! Integration tests using wiremock to simulate cloud metadata services.

use std::time::Duration;

use async_trait::async_trait;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use cloud_facts::{
    ArpTable, CloudProvider, ConnectionError, FactValue, Facts, HarvestError, HarvestOptions,
    HarvestOutcome, Harvester, MetadataClient, Transport,
};

async fn mount_text(server: &MockServer, at: &str, body: &str) {
    Mock::given(method("GET"))
        .and(path(at))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(server)
        .await;
}

// =============================================================================
// EC2 Tests
// =============================================================================

mod ec2 {
    use super::*;

    const META: &str = "/2008-02-01/meta-data/";

    /// ARP table that always shows the EC2 gateway.
    struct GatewayArp;

    #[async_trait]
    impl ArpTable for GatewayArp {
        async fn entries(&self, _windows: bool) -> Option<String> {
            Some("? (10.0.0.1) at fe:ff:ff:ff:ff:ff [ether] on eth0".to_string())
        }
    }

    async fn setup_ec2_mock(server: &MockServer) {
        mount_text(server, "/", "1.0\n2008-02-01\nlatest").await;
        mount_text(
            server,
            META,
            "ami-id\ninstance-id\nplacement/\npublic-keys/\nsecurity-groups",
        )
        .await;
        mount_text(server, "/2008-02-01/meta-data/ami-id", "ami-5f3e1a76").await;
        mount_text(server, "/2008-02-01/meta-data/instance-id", "i-1234abcd").await;
        mount_text(server, "/2008-02-01/meta-data/placement/", "availability-zone").await;
        mount_text(
            server,
            "/2008-02-01/meta-data/placement/availability-zone",
            "us-east-1c",
        )
        .await;
        mount_text(server, "/2008-02-01/meta-data/public-keys/", "0=deploy").await;
        mount_text(server, "/2008-02-01/meta-data/public-keys/0/", "openssh-key").await;
        mount_text(
            server,
            "/2008-02-01/meta-data/public-keys/0/openssh-key",
            "ssh-rsa AAAA deploy",
        )
        .await;
        mount_text(
            server,
            "/2008-02-01/meta-data/security-groups",
            "default\nweb",
        )
        .await;
        mount_text(server, "/2008-02-01/user-data/", "role=web\nenv=prod").await;
    }

    #[tokio::test]
    async fn test_ec2_harvest() {
        let server = MockServer::start().await;
        setup_ec2_mock(&server).await;

        let harvester = Harvester::ec2_with_base_url(&server.uri())
            .unwrap()
            .with_arp_table(GatewayArp);
        let mut facts = Facts::new().with("kernel", "Linux");
        let outcome = harvester.harvest(&mut facts, false).await.unwrap();

        assert_eq!(outcome, HarvestOutcome::Complete { facts: 6 });
        assert_eq!(facts.get("ec2_ami_id"), Some(&FactValue::from("ami-5f3e1a76")));
        assert_eq!(facts.get("ec2_instance_id"), Some(&FactValue::from("i-1234abcd")));
        assert_eq!(
            facts.get("ec2_placement_availability_zone"),
            Some(&FactValue::from("us-east-1c"))
        );
        assert_eq!(
            facts.get("ec2_public_keys_0_openssh_key"),
            Some(&FactValue::from("ssh-rsa AAAA deploy"))
        );
        assert_eq!(
            facts.get("ec2_security_groups"),
            Some(&FactValue::from("default,web"))
        );
        assert_eq!(
            facts.get("ec2_userdata"),
            Some(&FactValue::List(vec![
                "role=web".to_string(),
                "env=prod".to_string()
            ]))
        );
    }

    #[tokio::test]
    async fn test_ec2_missing_leaf_is_skipped() {
        let server = MockServer::start().await;
        mount_text(&server, "/", "latest").await;
        mount_text(&server, META, "hostname\nkernel-id").await;
        mount_text(&server, "/2008-02-01/meta-data/hostname", "ip-10-0-0-1").await;
        // kernel-id is not mounted and answers 404

        let harvester = Harvester::ec2_with_base_url(&server.uri()).unwrap();
        let mut facts = Facts::new().with("macaddress", "fa:16:3e:12:34:56");
        let outcome = harvester.harvest(&mut facts, false).await.unwrap();

        assert_eq!(outcome, HarvestOutcome::Complete { facts: 1 });
        assert_eq!(
            facts.get("ec2_hostname"),
            Some(&FactValue::from("ip-10-0-0-1"))
        );
        assert!(facts.get("ec2_kernel_id").is_none());
        assert!(facts.get("ec2_userdata").is_none());
    }

    #[tokio::test]
    async fn test_ec2_not_a_candidate() {
        let server = MockServer::start().await;
        setup_ec2_mock(&server).await;

        struct EmptyArp;

        #[async_trait]
        impl ArpTable for EmptyArp {
            async fn entries(&self, _windows: bool) -> Option<String> {
                None
            }
        }

        let harvester = Harvester::ec2_with_base_url(&server.uri())
            .unwrap()
            .with_arp_table(EmptyArp);
        let mut facts = Facts::new().with("macaddress", "00:0c:29:aa:bb:cc");
        let outcome = harvester.harvest(&mut facts, false).await.unwrap();

        assert_eq!(outcome, HarvestOutcome::Unavailable);
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_ec2_provider() {
        let harvester = Harvester::ec2_with_base_url("http://localhost:1234").unwrap();
        assert_eq!(harvester.provider(), CloudProvider::Ec2);
    }
}

// =============================================================================
// GCE Tests
// =============================================================================

mod gce {
    use super::*;

    const DOCUMENT: &str = r#"{
        "instance": {
            "id": 12345678901234,
            "machineType": "projects/123/machineTypes/n1-standard-1",
            "zone": "projects/123/zones/us-central1-a",
            "tags": ["http-server", "ssh"],
            "networkInterfaces": [
                {"ip": "10.240.0.2", "network": "projects/123/networks/default"}
            ],
            "attributes": {"sshKeys": "alice:ssh-rsa AAAA alice\nbob:ssh-rsa BBBB bob\n"}
        },
        "project": {"projectId": "facter-test", "numericProjectId": 123}
    }"#;

    async fn setup_gce_mock(server: &MockServer, document: &str) {
        Mock::given(method("GET"))
            .and(path("/"))
            .and(header("Metadata-Flavor", "Google"))
            .respond_with(ResponseTemplate::new(200).set_body_string("computeMetadata/"))
            .mount(server)
            .await;

        Mock::given(method("GET"))
            .and(path("/computeMetadata/v1/"))
            .and(query_param("recursive", "true"))
            .and(query_param("alt", "json"))
            .and(header("Metadata-Flavor", "Google"))
            .respond_with(ResponseTemplate::new(200).set_body_string(document))
            .mount(server)
            .await;
    }

    fn gce_host() -> Facts {
        Facts::new().with("virtual", "gce")
    }

    #[tokio::test]
    async fn test_gce_harvest() {
        let server = MockServer::start().await;
        setup_gce_mock(&server, DOCUMENT).await;

        let harvester = Harvester::gce_with_base_url(&server.uri()).unwrap();
        let mut facts = gce_host();
        let outcome = harvester.harvest(&mut facts, false).await.unwrap();

        assert_eq!(outcome, HarvestOutcome::Complete { facts: 11 });
        assert_eq!(
            facts.get("gce_instance_id"),
            Some(&FactValue::Integer(12345678901234))
        );
        assert_eq!(
            facts.get("gce_instance_machineType"),
            Some(&FactValue::from("n1-standard-1"))
        );
        assert_eq!(
            facts.get("gce_instance_zone"),
            Some(&FactValue::from("us-central1-a"))
        );
        assert_eq!(
            facts.get("gce_instance_tags_1"),
            Some(&FactValue::from("ssh"))
        );
        assert_eq!(
            facts.get("gce_instance_networkInterfaces_0_network"),
            Some(&FactValue::from("default"))
        );
        assert_eq!(
            facts.get("gce_instance_attributes_sshKeys_0"),
            Some(&FactValue::from("alice:ssh-rsa AAAA alice"))
        );
        assert_eq!(
            facts.get("gce_instance_attributes_sshKeys_1"),
            Some(&FactValue::from("bob:ssh-rsa BBBB bob"))
        );
        assert_eq!(
            facts.get("gce_project_projectId"),
            Some(&FactValue::from("facter-test"))
        );
    }

    #[tokio::test]
    async fn test_gce_harvest_runs_once() {
        let server = MockServer::start().await;
        setup_gce_mock(&server, r#"{"instance":{"hostname":"box"}}"#).await;

        let harvester = Harvester::gce_with_base_url(&server.uri()).unwrap();
        let mut facts = gce_host();

        let first = harvester.harvest(&mut facts, false).await.unwrap();
        assert_eq!(first, HarvestOutcome::Complete { facts: 1 });
        let requests = server.received_requests().await.unwrap().len();

        let second = harvester.harvest(&mut facts, false).await.unwrap();
        assert_eq!(second, HarvestOutcome::Skipped);
        assert_eq!(server.received_requests().await.unwrap().len(), requests);

        let forced = harvester.harvest(&mut facts, true).await.unwrap();
        assert_eq!(forced, HarvestOutcome::Complete { facts: 1 });
        assert_eq!(server.received_requests().await.unwrap().len(), requests * 2);
    }

    #[tokio::test]
    async fn test_gce_malformed_json() {
        let server = MockServer::start().await;
        setup_gce_mock(&server, "<html>Service Unavailable</html>").await;

        let harvester = Harvester::gce_with_base_url(&server.uri()).unwrap();
        let mut facts = gce_host();
        let outcome = harvester.harvest(&mut facts, false).await.unwrap();

        assert_eq!(outcome, HarvestOutcome::Partial { facts: 0 });
        assert_eq!(facts.len(), 1);
    }

    #[tokio::test]
    async fn test_gce_other_platform() {
        let server = MockServer::start().await;
        setup_gce_mock(&server, DOCUMENT).await;

        let harvester = Harvester::gce_with_base_url(&server.uri()).unwrap();
        let mut facts = Facts::new().with("virtual", "kvm");
        let outcome = harvester.harvest(&mut facts, false).await.unwrap();

        assert_eq!(outcome, HarvestOutcome::Unavailable);
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_gce_provider() {
        let harvester = Harvester::gce_with_base_url("http://localhost:1234").unwrap();
        assert_eq!(harvester.provider(), CloudProvider::Gce);
    }
}

// =============================================================================
// Reachability Tests
// =============================================================================

mod reachability {
    use super::*;

    #[tokio::test]
    async fn test_probe_reachable() {
        let server = MockServer::start().await;
        mount_text(&server, "/", "computeMetadata/").await;

        let harvester = Harvester::gce_with_base_url(&server.uri()).unwrap();
        let facts = Facts::new().with("virtual", "gce");
        assert!(harvester.probe(&facts).await.unwrap());
    }

    #[tokio::test]
    async fn test_probe_retries_then_gives_up() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(503))
            .expect(2)
            .mount(&server)
            .await;

        let options = HarvestOptions::default().with_retry_limit(2);
        let harvester =
            Harvester::from_options(CloudProvider::Gce, Some(server.uri().as_str()), options).unwrap();
        let mut facts = Facts::new().with("virtual", "gce");
        let outcome = harvester.harvest(&mut facts, false).await.unwrap();

        assert_eq!(outcome, HarvestOutcome::Unavailable);
        assert_eq!(facts.len(), 1);
    }

    #[tokio::test]
    async fn test_unreachable_service() {
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let uri = format!("http://127.0.0.1:{port}");

        let harvester = Harvester::gce_with_base_url(&uri).unwrap();
        let mut facts = Facts::new().with("virtual", "gce");
        let outcome = harvester.harvest(&mut facts, false).await.unwrap();

        assert_eq!(outcome, HarvestOutcome::Unavailable);
        assert!(harvester.run_guard().is_done());
    }

    #[tokio::test]
    async fn test_missing_fact_option() {
        let options = HarvestOptions {
            fact: None,
            ..HarvestOptions::default()
        };
        let harvester =
            Harvester::from_options(CloudProvider::Gce, Some("http://localhost:1234"), options)
                .unwrap();
        let mut facts = Facts::new();
        let result = harvester.harvest(&mut facts, false).await;

        assert!(matches!(result, Err(HarvestError::MissingOption("fact"))));
    }
}

// =============================================================================
// Transport Tests
// =============================================================================

mod transport {
    use super::*;

    #[tokio::test]
    async fn test_not_found_is_http_error() {
        let server = MockServer::start().await;
        let client = MetadataClient::for_provider(CloudProvider::Ec2, Duration::from_secs(1)).unwrap();

        let result = client.read(&format!("{}/missing", server.uri())).await;
        assert_eq!(result, Err(ConnectionError::Http(404)));
    }

    #[tokio::test]
    async fn test_slow_response_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/slow"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("late")
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;
        let client =
            MetadataClient::for_provider(CloudProvider::Gce, Duration::from_millis(50)).unwrap();

        let result = client.read(&format!("{}/slow", server.uri())).await;
        assert_eq!(result, Err(ConnectionError::TimedOut));
    }

    #[tokio::test]
    async fn test_gce_client_sends_flavor_header() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/computeMetadata/v1/instance/id"))
            .and(header("Metadata-Flavor", "Google"))
            .respond_with(ResponseTemplate::new(200).set_body_string("42"))
            .mount(&server)
            .await;
        let client =
            MetadataClient::for_provider(CloudProvider::Gce, Duration::from_secs(1)).unwrap();

        let body = client
            .read(&format!("{}/computeMetadata/v1/instance/id", server.uri()))
            .await
            .unwrap();
        assert_eq!(body, "42");
    }
}
