#![cfg(unix)]

// Kept in its own test binary: raising SIGINT reaches the whole process

use minidb::*;
use signal_hook::consts::SIGINT;
use std::io::{BufRead, BufReader, Write};
use std::net::TcpStream;
use std::time::Duration;

#[test]
fn sigint_saves_snapshot_and_stops() {
    let path = std::env::temp_dir().join(format!("minidb-signal-{}.db", std::process::id()));
    std::fs::write(&path, "").unwrap();

    let mut server = Server::bind(&Config::new(0, &path)).expect("bind server");
    server.install_signal_handlers().expect("install handlers");
    let addr = server.local_addr().unwrap();
    let handle = std::thread::spawn(move || server.run());

    let mut stream = TcpStream::connect(addr).expect("Failed to connect");
    stream
        .set_read_timeout(Some(Duration::from_secs(10)))
        .unwrap();
    let mut reader = BufReader::new(stream.try_clone().unwrap());
    stream.write_all(b"POST a b\n").unwrap();
    let mut reply = String::new();
    reader.read_line(&mut reply).unwrap();
    assert_eq!(reply, "0\n");

    signal_hook::low_level::raise(SIGINT).unwrap();

    handle
        .join()
        .expect("server thread panicked")
        .expect("server run failed");
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "a b\n");
    std::fs::remove_file(path).ok();
}
