//! Protocol level tests: a real server on a local port, driven with raw
//! command lines over TCP.

use pretty_assertions::assert_eq;
use regex::Regex;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

struct TestServer {
    addr: &'static str,
    root: tempfile::TempDir,
}

// Starts a server with the given control address and passive range on a
// fresh temp root, and waits for it to accept connections.
async fn start_server(addr: &'static str, passive_ports: std::ops::RangeInclusive<u16>) -> TestServer {
    let root = tempfile::tempdir().unwrap();
    let path = root.path().to_path_buf();
    tokio::spawn(async move {
        quayftp::Server::with_fs_root(path)
            .passive_ports(passive_ports)
            .listen(addr)
            .await
            .unwrap();
    });
    for _ in 0..50 {
        if TcpStream::connect(addr).await.is_ok() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    TestServer { addr, root }
}

struct Client {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl Client {
    async fn connect(addr: &str) -> Self {
        let stream = TcpStream::connect(addr).await.unwrap();
        let (read_half, writer) = stream.into_split();
        let mut client = Client {
            reader: BufReader::new(read_half),
            writer,
        };
        client.expect("220 FTP server ready").await;
        client
    }

    async fn send(&mut self, line: &str) {
        self.writer.write_all(format!("{}\r\n", line).as_bytes()).await.unwrap();
    }

    async fn line(&mut self) -> String {
        let mut line = String::new();
        tokio::time::timeout(Duration::from_secs(15), self.reader.read_line(&mut line))
            .await
            .expect("timed out waiting for a reply")
            .unwrap();
        line.trim_end().to_string()
    }

    async fn expect(&mut self, wanted: &str) {
        assert_eq!(self.line().await, wanted);
    }

    async fn cmd(&mut self, command: &str, wanted: &str) {
        self.send(command).await;
        self.expect(wanted).await;
    }

    async fn login(&mut self) {
        self.cmd("USER alice", "331 User name okay, need password.").await;
        self.cmd("PASS secret", "230 User logged in, proceed.").await;
    }

    // Issues PASV and returns the address the 227 reply points at.
    async fn pasv(&mut self) -> SocketAddr {
        self.send("PASV").await;
        let line = self.line().await;
        assert!(line.starts_with("227 Entering Passive Mode ("), "unexpected PASV reply: {}", line);
        let inside = line.split('(').nth(1).unwrap().trim_end_matches(')');
        let parts: Vec<u16> = inside.split(',').map(|p| p.parse().unwrap()).collect();
        assert_eq!(parts.len(), 6);
        let port = (parts[4] << 8) | parts[5];
        format!("{}.{}.{}.{}:{}", parts[0], parts[1], parts[2], parts[3], port).parse().unwrap()
    }
}

async fn read_to_end(data: TcpStream) -> Vec<u8> {
    let mut data = data;
    let mut out = Vec::new();
    data.read_to_end(&mut out).await.unwrap();
    out
}

#[tokio::test]
async fn login_and_pwd() {
    let server = start_server("127.0.0.1:2141", 51100..=51109).await;
    let mut client = Client::connect(server.addr).await;

    client.login().await;
    client.cmd("PWD", "257 \"/\" is current directory").await;
}

#[tokio::test]
async fn commands_require_login() {
    let server = start_server("127.0.0.1:2142", 51110..=51119).await;
    let mut client = Client::connect(server.addr).await;

    client.cmd("PWD", "530 Not logged in.").await;
    client.cmd("PASV", "530 Not logged in.").await;
    client.cmd("DELE x", "530 Not logged in.").await;
    // The NO_AUTH set stays reachable
    client.cmd("NOOP", "200 OK").await;
    client.cmd("SYST", "215 UNIX Type: L8").await;
}

#[tokio::test]
async fn unknown_command_is_502() {
    let server = start_server("127.0.0.1:2143", 51120..=51129).await;
    let mut client = Client::connect(server.addr).await;

    client.cmd("SITE CHMOD 755 f", "502 Command not implemented.").await;
    client.cmd("REST 100", "502 Command not implemented.").await;
}

#[tokio::test]
async fn pasv_then_list() {
    let server = start_server("127.0.0.1:2144", 51130..=51139).await;
    std::fs::write(server.root.path().join("hello.txt"), b"hello quay").unwrap();
    std::fs::create_dir(server.root.path().join("sub")).unwrap();

    let mut client = Client::connect(server.addr).await;
    client.login().await;

    let data_addr = client.pasv().await;
    let data = TcpStream::connect(data_addr).await.unwrap();

    client.cmd("LIST", "150 Here comes the directory listing").await;
    let listing = String::from_utf8(read_to_end(data).await).unwrap();
    client.expect("226 Transfer OK").await;

    let line_re = Regex::new(r"^[-d]([rwx-]){9} 1 \w+ \w+ +\d+ [A-Z][a-z]{2} [ \d]\d \d\d:\d\d .+$").unwrap();
    let lines: Vec<&str> = listing.split("\r\n").filter(|l| !l.is_empty()).collect();
    assert_eq!(lines.len(), 2);
    for line in &lines {
        assert!(line_re.is_match(line), "listing line has unexpected shape: {:?}", line);
    }
    assert!(lines[0].ends_with("hello.txt"));
    assert!(lines[1].starts_with('d') && lines[1].ends_with("sub"));
}

#[tokio::test]
async fn pasv_after_port_is_refused() {
    let server = start_server("127.0.0.1:2145", 51140..=51149).await;
    let mut client = Client::connect(server.addr).await;
    client.login().await;

    client.cmd("PORT 127,0,0,1,20,0", "200 OK").await;
    client.cmd("PASV", "503 Bad sequence of commands.").await;
    client.cmd("PORT 127,0,0,1,20,1", "503 Bad sequence of commands.").await;
}

#[tokio::test]
async fn retr_missing_file_is_550() {
    let server = start_server("127.0.0.1:2146", 51150..=51159).await;
    let mut client = Client::connect(server.addr).await;
    client.login().await;

    client.cmd("RETR nope.txt", "550 Not Found").await;
}

#[tokio::test]
async fn retr_sends_file_content() {
    let server = start_server("127.0.0.1:2147", 51160..=51169).await;
    let payload = b"some important bytes".to_vec();
    std::fs::write(server.root.path().join("data.bin"), &payload).unwrap();

    let mut client = Client::connect(server.addr).await;
    client.login().await;

    let data_addr = client.pasv().await;
    let data = TcpStream::connect(data_addr).await.unwrap();

    client.cmd("RETR data.bin", "150 Opening BINARY mode data connection").await;
    let received = read_to_end(data).await;
    client.expect(&format!("226 Closing data connection, sent {} bytes", payload.len())).await;
    assert_eq!(received, payload);
}

#[tokio::test]
async fn stor_writes_file() {
    let server = start_server("127.0.0.1:2148", 51170..=51179).await;
    let mut client = Client::connect(server.addr).await;
    client.login().await;

    let data_addr = client.pasv().await;
    let mut data = TcpStream::connect(data_addr).await.unwrap();

    client.cmd("STOR upload.txt", "150 Ok to send data").await;
    data.write_all(b"uploaded content").await.unwrap();
    data.shutdown().await.unwrap();
    drop(data);
    client.expect("226 Closing data connection").await;

    let written = std::fs::read(server.root.path().join("upload.txt")).unwrap();
    assert_eq!(written, b"uploaded content");
}

#[tokio::test]
async fn appe_appends_to_existing_file() {
    let server = start_server("127.0.0.1:2149", 51180..=51189).await;
    std::fs::write(server.root.path().join("log.txt"), b"first|").unwrap();

    let mut client = Client::connect(server.addr).await;
    client.login().await;

    let data_addr = client.pasv().await;
    let mut data = TcpStream::connect(data_addr).await.unwrap();

    client.cmd("APPE log.txt", "150 Ok to send data").await;
    data.write_all(b"second").await.unwrap();
    data.shutdown().await.unwrap();
    drop(data);
    client.expect("226 Closing data connection").await;

    let written = std::fs::read(server.root.path().join("log.txt")).unwrap();
    assert_eq!(written, b"first|second");
}

#[tokio::test]
async fn transfer_rearms_pasv() {
    let server = start_server("127.0.0.1:2150", 51190..=51199).await;
    std::fs::write(server.root.path().join("f.txt"), b"x").unwrap();

    let mut client = Client::connect(server.addr).await;
    client.login().await;

    let data_addr = client.pasv().await;
    let data = TcpStream::connect(data_addr).await.unwrap();
    client.cmd("RETR f.txt", "150 Opening BINARY mode data connection").await;
    read_to_end(data).await;
    client.expect("226 Closing data connection, sent 1 bytes").await;

    // After the transfer completed the sub-state is NONE again.
    let second_addr = client.pasv().await;
    let data = TcpStream::connect(second_addr).await.unwrap();
    client.cmd("RETR f.txt", "150 Opening BINARY mode data connection").await;
    read_to_end(data).await;
    client.expect("226 Closing data connection, sent 1 bytes").await;
}

#[tokio::test]
async fn feat_lists_extensions() {
    let server = start_server("127.0.0.1:2151", 51200..=51209).await;
    let mut client = Client::connect(server.addr).await;

    client.send("FEAT").await;
    client.expect("211-Features:").await;
    let mut features = Vec::new();
    loop {
        let line = client.line().await;
        if line == "211 End" {
            break;
        }
        features.push(line.trim().to_string());
    }
    for wanted in ["SIZE", "UTF8", "MDTM"].iter() {
        assert!(features.iter().any(|f| f == wanted), "FEAT reply missing {}", wanted);
    }
    // No TLS configured, so the security extensions stay hidden
    assert!(!features.iter().any(|f| f == "PROT"));
}

#[tokio::test]
async fn eprt_rejects_ipv6_family() {
    let server = start_server("127.0.0.1:2152", 51210..=51219).await;
    let mut client = Client::connect(server.addr).await;
    client.login().await;

    client.cmd("EPRT |2|1080::8:800:200C:417A|5282|", "522 Network protocol not supported, use (1)").await;
    client.cmd("EPRT |1|127.0.0.1|0|", "501 Invalid parameter").await;
}

#[tokio::test]
async fn size_mdtm_and_dir_commands() {
    let server = start_server("127.0.0.1:2153", 51220..=51229).await;
    std::fs::write(server.root.path().join("sized.txt"), b"123456789").unwrap();

    let mut client = Client::connect(server.addr).await;
    client.login().await;

    client.cmd("SIZE sized.txt", "213 9").await;

    client.send("MDTM sized.txt").await;
    let line = client.line().await;
    let re = Regex::new(r"^213 \d{14}$").unwrap();
    assert!(re.is_match(&line), "unexpected MDTM reply: {}", line);

    client.cmd("MKD photos", "257 \"/photos\" directory created").await;
    client.cmd("CWD photos", "250 CWD successful. \"/photos\" is current directory").await;
    client.cmd("PWD", "257 \"/photos\" is current directory").await;
    client.cmd("CDUP", "250 CWD successful. \"/\" is current directory").await;
    client.cmd("RMD photos", "250 Folder deleted").await;
    client.cmd("CWD photos", "550 No such file or directory").await;
}

#[tokio::test]
async fn rename_two_step() {
    let server = start_server("127.0.0.1:2154", 51230..=51239).await;
    std::fs::write(server.root.path().join("old.txt"), b"payload").unwrap();

    let mut client = Client::connect(server.addr).await;
    client.login().await;

    client.cmd("RNTO new.txt", "503 RNFR required first").await;
    client.cmd("RNFR old.txt", "350 Ready for destination name").await;
    client.cmd("RNTO new.txt", "250 File renamed successfully").await;
    assert!(server.root.path().join("new.txt").exists());
    assert!(!server.root.path().join("old.txt").exists());

    // The stored source is cleared by RNTO
    client.cmd("RNTO another.txt", "503 RNFR required first").await;
}

#[tokio::test]
async fn pass_without_user_is_503() {
    let server = start_server("127.0.0.1:2155", 51240..=51249).await;
    let mut client = Client::connect(server.addr).await;

    client.cmd("PASS secret", "503 Bad sequence of commands.").await;
}

#[tokio::test]
async fn pool_exhaustion_yields_421() {
    // A single passive port: the second session from the same IP must be
    // turned away once the port carries a waiter.
    let server = start_server("127.0.0.1:2156", 51250..=51250).await;

    let mut first = Client::connect(server.addr).await;
    first.login().await;
    let first_addr = first.pasv().await;
    assert_eq!(first_addr.port(), 51250);

    let mut second = Client::connect(server.addr).await;
    second.login().await;
    second.send("PASV").await;
    second.expect("421 Server was unable to open passive connection listener").await;
}

#[tokio::test]
async fn quit_closes_the_session() {
    let server = start_server("127.0.0.1:2157", 51260..=51269).await;
    let mut client = Client::connect(server.addr).await;

    client.cmd("QUIT", "221 Goodbye.").await;
    // The server closes the connection; the next read sees EOF.
    let mut rest = String::new();
    client.reader.read_line(&mut rest).await.unwrap();
    assert_eq!(rest, "");
}

#[tokio::test]
async fn nlst_sends_bare_names() {
    let server = start_server("127.0.0.1:2158", 51270..=51279).await;
    std::fs::write(server.root.path().join("b.txt"), b"b").unwrap();
    std::fs::write(server.root.path().join("a.txt"), b"a").unwrap();

    let mut client = Client::connect(server.addr).await;
    client.login().await;

    let data_addr = client.pasv().await;
    let data = TcpStream::connect(data_addr).await.unwrap();

    client.cmd("NLST", "150 Here comes the directory listing").await;
    let listing = String::from_utf8(read_to_end(data).await).unwrap();
    client.expect("226 Transfer OK").await;

    assert_eq!(listing, "a.txt\r\nb.txt\r\n");
}

#[tokio::test]
async fn list_with_wildcard_argument() {
    let server = start_server("127.0.0.1:2159", 51280..=51289).await;
    std::fs::write(server.root.path().join("note.txt"), b"n").unwrap();
    std::fs::write(server.root.path().join("image.png"), b"p").unwrap();

    let mut client = Client::connect(server.addr).await;
    client.login().await;

    let data_addr = client.pasv().await;
    let data = TcpStream::connect(data_addr).await.unwrap();

    client.cmd("NLST *.txt", "150 Here comes the directory listing").await;
    let listing = String::from_utf8(read_to_end(data).await).unwrap();
    client.expect("226 Transfer OK").await;

    assert_eq!(listing, "note.txt\r\n");
}

#[tokio::test]
async fn stat_lists_over_control_channel() {
    let server = start_server("127.0.0.1:2160", 51290..=51299).await;
    std::fs::write(server.root.path().join("one.txt"), b"1").unwrap();

    let mut client = Client::connect(server.addr).await;
    client.login().await;

    client.send("STAT .").await;
    client.expect("213-Status follows").await;
    let line = client.line().await;
    assert!(line.ends_with("one.txt"), "unexpected STAT line: {}", line);
    client.expect("213 End of status").await;
}
