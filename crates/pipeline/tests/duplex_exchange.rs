use std::sync::{Arc, Mutex};

use bytes::Bytes;
use http::header::{CONTENT_LENGTH, TRANSFER_ENCODING};
use http::{Method, StatusCode};
use micro_pipeline::PipelineConfig;
use micro_pipeline::connection::{IoDriver, IoTransport, TransportBinding};
use micro_pipeline::handler::ServerHandler;
use micro_pipeline::protocol::{ClientRequest, IncomingMessage, RequestOptions, ServerResponse};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

fn init_tracing() {
    let subscriber = FmtSubscriber::builder().with_max_level(Level::DEBUG).with_test_writer().finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

fn echo(mut request: IncomingMessage, mut response: ServerResponse<IoTransport>) {
    tokio::spawn(async move {
        let body = request.collect_body().await.unwrap();
        response.set_header(TRANSFER_ENCODING, "chunked").unwrap();
        response.write(Bytes::from(format!("{} ", request.url().unwrap_or_default())));
        response.end(Some(body));
    });
}

#[tokio::test]
async fn server_streams_chunked_echo() {
    init_tracing();
    let config = PipelineConfig::default();
    let (client, server) = tokio::io::duplex(4096);
    let (server_read, server_write) = tokio::io::split(server);

    let binding = TransportBinding::server(ServerHandler::new(echo), &config);
    let server_task = tokio::spawn(IoDriver::new(server_read, server_write, binding, &config).run());

    let (mut client_read, mut client_write) = tokio::io::split(client);
    client_write
        .write_all(b"POST /echo HTTP/1.1\r\nTransfer-Encoding: chunked\r\nConnection: close\r\n\r\n3\r\nabc\r\n")
        .await
        .unwrap();
    client_write.write_all(b"2\r\nde\r\n0\r\n\r\n").await.unwrap();

    let mut received = Vec::new();
    client_read.read_to_end(&mut received).await.unwrap();
    assert_eq!(
        String::from_utf8(received).unwrap(),
        "HTTP/1.1 200 OK\r\nconnection: close\r\ntransfer-encoding: chunked\r\n\r\n6\r\n/echo \r\n5\r\nabcde\r\n0\r\n\r\n"
    );

    drop(client_write);
    server_task.await.unwrap().unwrap();
}

#[tokio::test]
async fn client_talks_to_server() {
    init_tracing();
    let config = PipelineConfig::default();
    let (client, server) = tokio::io::duplex(4096);

    let (server_read, server_write) = tokio::io::split(server);
    let handler = ServerHandler::new(|request: IncomingMessage, mut response: ServerResponse<IoTransport>| {
        let body = format!("{} {}", request.method().map(Method::as_str).unwrap_or_default(), request.url().unwrap_or_default());
        response.set_header(CONTENT_LENGTH, body.len()).unwrap();
        response.end(Some(Bytes::from(body)));
    });
    let server_task =
        tokio::spawn(IoDriver::new(server_read, server_write, TransportBinding::server(handler, &config), &config).run());

    let responses = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&responses);
    let (mut request, response_handler) =
        ClientRequest::new(RequestOptions::new(Method::GET, "/hello"), move |response: IncomingMessage| {
            sink.lock().unwrap().push(response);
        });
    request.set_header("connection", "close").unwrap();
    request.end(None);

    let (client_read, client_write) = tokio::io::split(client);
    let mut driver = IoDriver::new(client_read, client_write, TransportBinding::client(response_handler, &config), &config);
    driver.connect(Some(request.message_mut()));
    driver.run().await.unwrap();

    let mut response = responses.lock().unwrap().remove(0);
    assert_eq!(response.status(), Some(StatusCode::OK));
    assert_eq!(response.headers()[CONTENT_LENGTH], "10");
    assert_eq!(response.collect_body().await.unwrap(), Bytes::from_static(b"GET /hello"));
    assert!(request.is_finished());

    server_task.await.unwrap().unwrap();
}
