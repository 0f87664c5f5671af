// Manifest resolution and login against a mock platform

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use vod_downloader_lib::downloader::extractors::{
    Credentials, ManifestResolver, ManifestSource, ResolverConfig, SoopConfig, SoopSource,
};
use vod_downloader_lib::downloader::{normalize, DownloadError, Quality};

const VIEW: &str = "/station/video/a/view";
const LOGIN: &str = "/app/LoginAction.php";
const CHECK: &str = "/api/get_private_info.php";

fn q(height: u32) -> Quality {
    Quality::from_height(height).unwrap()
}

fn source(server: &MockServer) -> Arc<SoopSource> {
    let mut config = SoopConfig::default()
        .with_base_url(&server.uri())
        .with_timeout(Duration::from_secs(5));
    config.referer = format!("{}/", server.uri());
    Arc::new(SoopSource::new(config).unwrap())
}

fn resolver(server: &MockServer, attempts: u32) -> ManifestResolver {
    ManifestResolver::new(source(server) as Arc<dyn ManifestSource>).with_config(
        ResolverConfig::default()
            .with_max_attempts(attempts)
            .with_retry_backoff(Duration::from_millis(5)),
    )
}

fn master(entries: &[(&str, &str)]) -> String {
    let mut out = String::from("#EXTM3U\n#EXT-X-VERSION:3\n");
    for (resolution, uri) in entries {
        out.push_str(&format!(
            "#EXT-X-STREAM-INF:BANDWIDTH=4000000,RESOLUTION={},CODECS=\"avc1.640028,mp4a.40.2\"\n{}\n",
            resolution, uri
        ));
    }
    out
}

async fn mount_view(server: &MockServer, body: serde_json::Value) {
    Mock::given(method("POST"))
        .and(path(VIEW))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

async fn mount_playlist(server: &MockServer, at: &str, body: String) {
    Mock::given(method("GET"))
        .and(path(at))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_resolves_multi_part_vod() {
    let server = MockServer::start().await;
    let base = server.uri();

    Mock::given(method("POST"))
        .and(path(VIEW))
        .and(body_string_contains("nTitleNo=12345678"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "result": 1,
            "data": {
                "title": "Late night stream",
                "file_resolution": "1920x1080",
                "files": [
                    {"duration": 60000, "file": format!("{}/p1/master.m3u8", base)},
                    {"duration": "30000", "file": format!("{}/p2/master.m3u8", base)}
                ]
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    mount_playlist(&server, "/p1/master.m3u8", master(&[("1920x1080", "1080/index.m3u8"), ("1280x720", "720/index.m3u8")])).await;
    mount_playlist(&server, "/p2/master.m3u8", master(&[("1280x720", "720/index.m3u8"), ("1920x1080", "1080/index.m3u8")])).await;

    let id = normalize("https://vod.sooplive.co.kr/player/12345678").unwrap();
    let vod = resolver(&server, 3).resolve(&id).await.unwrap();

    assert_eq!(vod.title, "Late night stream");
    assert_eq!(vod.duration_ms, 90_000);
    let qualities: Vec<Quality> = vod.variants.iter().map(|v| v.quality).collect();
    assert_eq!(qualities, vec![q(1080), q(720)]);

    let best = &vod.variants[0];
    assert_eq!(best.segments.len(), 2);
    assert_eq!(best.segments[0].url, format!("{}/p1/1080/index.m3u8", base));
    assert_eq!(best.segments[0].duration_ms, 60_000);
    assert_eq!(best.segments[1].url, format!("{}/p2/1080/index.m3u8", base));
}

#[tokio::test]
async fn test_media_playlist_uses_rendition_quality() {
    let server = MockServer::start().await;
    let base = server.uri();

    mount_view(
        &server,
        json!({
            "result": 1,
            "data": {
                "title": "Single",
                "files": [{
                    "duration": 20000,
                    "quality_info": [
                        {"resolution": "1280x720", "file": format!("{}/720.m3u8", base)},
                        {"resolution": "852x480", "file": format!("{}/480.m3u8", base)}
                    ]
                }]
            }
        }),
    )
    .await;

    let media = "#EXTM3U\n#EXT-X-TARGETDURATION:10\n#EXTINF:10.0,\nseg0.ts\n#EXTINF:10.0,\nseg1.ts\n#EXT-X-ENDLIST\n";
    mount_playlist(&server, "/720.m3u8", media.to_string()).await;
    mount_playlist(&server, "/480.m3u8", media.to_string()).await;

    let vod = resolver(&server, 1).resolve(&normalize("7").unwrap()).await.unwrap();
    let qualities: Vec<Quality> = vod.variants.iter().map(|v| v.quality).collect();
    assert_eq!(qualities, vec![q(720), q(480)]);
    assert_eq!(vod.variants[1].segments[0].url, format!("{}/480.m3u8", base));
}

#[tokio::test]
async fn test_failed_result_is_not_available() {
    let server = MockServer::start().await;
    mount_view(
        &server,
        json!({"result": -1, "data": {"code": -1001, "message": "로그인이 필요합니다."}}),
    )
    .await;

    let err = resolver(&server, 3).resolve(&normalize("1").unwrap()).await.unwrap_err();
    assert!(matches!(err, DownloadError::NotAvailable(_)), "got {:?}", err);
}

#[tokio::test]
async fn test_http_404_is_not_available_without_retry() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(VIEW))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let err = resolver(&server, 3).resolve(&normalize("1").unwrap()).await.unwrap_err();
    assert!(matches!(err, DownloadError::NotAvailable(_)));
}

#[tokio::test]
async fn test_unexpected_body_is_protocol_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(VIEW))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
        .mount(&server)
        .await;

    let err = resolver(&server, 3).resolve(&normalize("1").unwrap()).await.unwrap_err();
    assert!(matches!(err, DownloadError::Protocol(_)));
}

#[tokio::test]
async fn test_playlist_without_header_is_protocol_error() {
    let server = MockServer::start().await;
    mount_view(
        &server,
        json!({"result": 1, "data": {"title": "t", "files": [{"duration": 1000, "file": format!("{}/p.m3u8", server.uri())}]}}),
    )
    .await;
    mount_playlist(&server, "/p.m3u8", "not a playlist".to_string()).await;

    let err = resolver(&server, 1).resolve(&normalize("1").unwrap()).await.unwrap_err();
    assert!(matches!(err, DownloadError::Protocol(_)));
}

#[tokio::test]
async fn test_server_errors_are_retried() {
    let server = MockServer::start().await;
    let base = server.uri();

    Mock::given(method("POST"))
        .and(path(VIEW))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    mount_view(
        &server,
        json!({"result": 1, "data": {"title": "t", "files": [{"duration": 1000, "file": format!("{}/m.m3u8", base)}]}}),
    )
    .await;
    mount_playlist(&server, "/m.m3u8", master(&[("1280x720", "720.m3u8")])).await;

    let vod = resolver(&server, 3).resolve(&normalize("1").unwrap()).await.unwrap();
    assert_eq!(vod.variants.len(), 1);
}

#[tokio::test]
async fn test_retries_are_bounded() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(VIEW))
        .respond_with(ResponseTemplate::new(502))
        .expect(2)
        .mount(&server)
        .await;

    let err = resolver(&server, 2).resolve(&normalize("1").unwrap()).await.unwrap_err();
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_quality_missing_from_a_part_leaves_no_streams() {
    let server = MockServer::start().await;
    let base = server.uri();

    mount_view(
        &server,
        json!({"result": 1, "data": {"title": "t", "files": [
            {"duration": 1000, "file": format!("{}/a.m3u8", base)},
            {"duration": 1000, "file": format!("{}/b.m3u8", base)}
        ]}}),
    )
    .await;
    mount_playlist(&server, "/a.m3u8", master(&[("1920x1080", "1080.m3u8")])).await;
    mount_playlist(&server, "/b.m3u8", master(&[("1280x720", "720.m3u8")])).await;

    let err = resolver(&server, 1).resolve(&normalize("1").unwrap()).await.unwrap_err();
    assert!(matches!(err, DownloadError::NoStreams(_)));
}

#[tokio::test]
async fn test_login_flow_keeps_session_cookie() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(CHECK))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"CHANNEL": {"IS_LOGIN": -1}})))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(CHECK))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"CHANNEL": {"IS_LOGIN": 1}})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(LOGIN))
        .and(body_string_contains("szUid=viewer"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("set-cookie", "PdboxTicket=ticket123; Path=/")
                .set_body_json(json!({"RESULT": 1})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let source = source(&server);
    let creds = Credentials {
        username: "viewer".into(),
        password: "secret".into(),
        second_password: None,
    };
    source.login(&creds).await.unwrap();
    assert!(source.check_auth().await);

    let headers = source.stream_headers();
    let cookie = headers.iter().find(|(k, _)| k == "Cookie").map(|(_, v)| v.as_str());
    assert_eq!(cookie, Some("PdboxTicket=ticket123"));
}

#[tokio::test]
async fn test_second_password_login() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(CHECK))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"CHANNEL": {"IS_LOGIN": -1}})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(LOGIN))
        .and(body_string_contains("szWork=second_login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"RESULT": 1})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(LOGIN))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"RESULT": -11})))
        .mount(&server)
        .await;

    let source = source(&server);
    let mut creds = Credentials {
        username: "viewer".into(),
        password: "secret".into(),
        second_password: None,
    };
    let err = source.login(&creds).await.unwrap_err();
    assert!(matches!(err, DownloadError::Auth(_)));

    creds.second_password = Some("2nd".into());
    source.login(&creds).await.unwrap();
}

#[tokio::test]
async fn test_wrong_password_is_auth_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(CHECK))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"CHANNEL": {"IS_LOGIN": -1}})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(LOGIN))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"RESULT": -1})))
        .mount(&server)
        .await;

    let creds = Credentials {
        username: "viewer".into(),
        password: "wrong".into(),
        second_password: None,
    };
    match source(&server).login(&creds).await {
        Err(DownloadError::Auth(msg)) => assert!(msg.contains("wrong password")),
        other => panic!("unexpected {:?}", other),
    }
}
