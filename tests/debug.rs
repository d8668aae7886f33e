use std::{
    io::{self, Write},
    sync::{Arc, Mutex},
};

use mailbridge::{transport::mailgun::Mailgun, Config, Mailer, Transmission};

mod common;

use common::StubServer;

#[derive(Clone, Default)]
struct Logs(Arc<Mutex<Vec<u8>>>);

impl Write for Logs {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[tokio::test]
async fn debug_mode() {
    let logs = Logs::default();
    let writer = logs.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_ansi(false)
        .with_writer(move || writer.clone())
        .finish();
    let _guard = tracing::subscriber::set_default(subscriber);

    mailbridge::set_debug(true);
    assert!(mailbridge::is_debug());

    let server = StubServer::start(401, r#"{"message":"Forbidden"}"#).await;
    let mailgun = Mailgun::new(Config {
        url: server.url.clone(),
        api_key: "secret-key".to_owned(),
        domain: "d".to_owned(),
        from_address: "a@b.c".to_owned(),
        from_name: "N".to_owned(),
        ..Config::default()
    })
    .unwrap();

    let err = mailgun
        .send(&Transmission {
            recipients: vec!["r@x".to_owned()],
            subject: "S".to_owned(),
            html: "<h1>H</h1>".to_owned(),
            ..Transmission::default()
        })
        .await
        .unwrap_err();

    // the failing operation is part of the message
    assert!(err
        .to_string()
        .starts_with("mailbridge: Client.Do: Error performing mail request"));

    let logs = String::from_utf8(logs.0.lock().unwrap().clone()).unwrap();
    let curl = format!("curl -i -X POST {}/v3/d/messages", server.url);
    assert!(logs.contains(&curl), "{}", logs);
    assert!(logs.contains(" -u api:****"));
    assert!(logs.contains(" -F to='r@x'"));
    assert!(!logs.contains("secret-key"));

    mailbridge::set_debug(false);
    assert!(!err.to_string().contains("Client.Do"));
}
