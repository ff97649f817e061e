use super::commands::{AuthParam, ProtParam, TypeParam};
use super::parse_error::{ParseErrorKind, Result};
use crate::server::password::Password;

use std::net::{Ipv4Addr, SocketAddrV4};
use std::{fmt, str};

/// A successfully parsed client command: the upper-cased verb plus its
/// argument, already broken down per command.
#[derive(Debug, PartialEq, Clone)]
pub enum Command {
    User {
        /// The username the client wants to log in as.
        username: String,
    },
    Pass {
        /// The password; its Debug rendering is redacted.
        password: Password,
    },
    Acct,
    Syst,
    Stat {
        /// The path about which information is requested, if given.
        path: Option<String>,
    },
    Type {
        /// The representation type. Anything but ASCII and Image only
        /// changes the reply, never the transfer itself.
        param: TypeParam,
    },
    Noop,
    Pasv,
    Epsv,
    Port {
        /// The address the client listens on for active mode.
        addr: SocketAddrV4,
    },
    Eprt {
        /// The address the client listens on for active mode.
        addr: SocketAddrV4,
    },
    Retr {
        /// The path to the file the client would like to retrieve.
        path: String,
    },
    Stor {
        /// The path to the file the client would like to store.
        path: String,
    },
    Appe {
        /// The path to the file the client would like to append to.
        path: String,
    },
    List {
        /// The raw argument, options still included.
        arg: Option<String>,
    },
    Nlst {
        /// The raw argument, options still included.
        arg: Option<String>,
    },
    Feat,
    Pwd,
    Cwd {
        /// The path the client would like to change directory to.
        path: String,
    },
    Cdup,
    Opts {
        /// The raw OPTS argument; only `UTF8 ON` is honoured.
        params: String,
    },
    Dele {
        /// The file to delete.
        path: String,
    },
    Rmd {
        /// The directory to delete.
        path: String,
    },
    Mkd {
        /// The path of the directory the client wants to create.
        path: String,
    },
    Quit,
    Allo,
    Rnfr {
        /// The file to be renamed.
        path: String,
    },
    Rnto {
        /// The filename to rename to.
        path: String,
    },
    Auth {
        /// The security mechanism, only TLS is honoured.
        protocol: AuthParam,
    },
    Pbsz {
        /// The requested protection buffer size. Anything but 0 is
        /// corrected in the reply.
        size: u64,
    },
    Prot {
        /// The requested data channel protection level.
        param: ProtParam,
    },
    Size {
        /// The file to report the size of.
        path: String,
    },
    Mdtm {
        /// The file to report the modification time of.
        path: String,
    },
}

impl Command {
    /// Parse one CRLF (or, leniently, LF) terminated line into a [`Command`].
    pub fn parse<T: AsRef<[u8]>>(buf: T) -> Result<Command> {
        let line = strip_eol(str::from_utf8(buf.as_ref())?)?;
        let mut iter = line.splitn(2, ' ');
        let verb = iter.next().unwrap_or("").to_uppercase();
        let arg = iter.next().unwrap_or("").trim().to_string();
        if arg.chars().any(|c| c.is_control()) {
            return Err(ParseErrorKind::InvalidCommand.into());
        }

        let cmd = match verb.as_str() {
            "USER" => Command::User {
                username: required(arg)?,
            },
            "PASS" => Command::Pass {
                password: Password::new(required(arg)?),
            },
            "ACCT" => Command::Acct,
            "SYST" => {
                no_arg(&arg)?;
                Command::Syst
            }
            "STAT" => Command::Stat { path: optional(arg) },
            "TYPE" => Command::Type {
                param: parse_type(&required(arg)?)?,
            },
            "NOOP" => {
                no_arg(&arg)?;
                Command::Noop
            }
            "PASV" => {
                no_arg(&arg)?;
                Command::Pasv
            }
            "EPSV" => {
                no_arg(&arg)?;
                Command::Epsv
            }
            "PORT" => Command::Port {
                addr: parse_port_arg(&required(arg)?)?,
            },
            "EPRT" => Command::Eprt {
                addr: parse_eprt_arg(&required(arg)?)?,
            },
            "RETR" => Command::Retr { path: required(arg)? },
            "STOR" => Command::Stor { path: required(arg)? },
            "APPE" => Command::Appe { path: required(arg)? },
            "LIST" => Command::List { arg: optional(arg) },
            "NLST" => Command::Nlst { arg: optional(arg) },
            "FEAT" => {
                no_arg(&arg)?;
                Command::Feat
            }
            "PWD" | "XPWD" => {
                no_arg(&arg)?;
                Command::Pwd
            }
            "CWD" | "XCWD" => Command::Cwd { path: required(arg)? },
            "CDUP" => {
                no_arg(&arg)?;
                Command::Cdup
            }
            "OPTS" => Command::Opts { params: required(arg)? },
            "DELE" => Command::Dele { path: required(arg)? },
            "RMD" | "XRMD" => Command::Rmd { path: required(arg)? },
            "MKD" | "XMKD" => Command::Mkd { path: required(arg)? },
            "QUIT" => {
                no_arg(&arg)?;
                Command::Quit
            }
            "ALLO" => Command::Allo,
            "RNFR" => Command::Rnfr { path: required(arg)? },
            "RNTO" => Command::Rnto { path: required(arg)? },
            "AUTH" => Command::Auth {
                protocol: parse_auth(&required(arg)?)?,
            },
            "PBSZ" => Command::Pbsz {
                size: required(arg)?.parse::<u64>().map_err(|_| ParseErrorKind::InvalidCommand)?,
            },
            "PROT" => Command::Prot {
                param: parse_prot(&required(arg)?)?,
            },
            "SIZE" => Command::Size { path: required(arg)? },
            "MDTM" => Command::Mdtm { path: required(arg)? },
            _ => {
                return Err(ParseErrorKind::UnknownCommand { command: verb }.into());
            }
        };

        Ok(cmd)
    }

    /// The upper-cased verb, for whitelisting and logging.
    pub fn verb(&self) -> &'static str {
        match self {
            Command::User { .. } => "USER",
            Command::Pass { .. } => "PASS",
            Command::Acct => "ACCT",
            Command::Syst => "SYST",
            Command::Stat { .. } => "STAT",
            Command::Type { .. } => "TYPE",
            Command::Noop => "NOOP",
            Command::Pasv => "PASV",
            Command::Epsv => "EPSV",
            Command::Port { .. } => "PORT",
            Command::Eprt { .. } => "EPRT",
            Command::Retr { .. } => "RETR",
            Command::Stor { .. } => "STOR",
            Command::Appe { .. } => "APPE",
            Command::List { .. } => "LIST",
            Command::Nlst { .. } => "NLST",
            Command::Feat => "FEAT",
            Command::Pwd => "PWD",
            Command::Cwd { .. } => "CWD",
            Command::Cdup => "CDUP",
            Command::Opts { .. } => "OPTS",
            Command::Dele { .. } => "DELE",
            Command::Rmd { .. } => "RMD",
            Command::Mkd { .. } => "MKD",
            Command::Quit => "QUIT",
            Command::Allo => "ALLO",
            Command::Rnfr { .. } => "RNFR",
            Command::Rnto { .. } => "RNTO",
            Command::Auth { .. } => "AUTH",
            Command::Pbsz { .. } => "PBSZ",
            Command::Prot { .. } => "PROT",
            Command::Size { .. } => "SIZE",
            Command::Mdtm { .. } => "MDTM",
        }
    }

    /// Commands the server accepts before a USER/PASS pair succeeded. The
    /// same set is exempt from the TLS-only gate.
    pub fn is_exempt_from_auth(&self) -> bool {
        matches!(
            self,
            Command::User { .. }
                | Command::Pass { .. }
                | Command::Quit
                | Command::Feat
                | Command::Auth { .. }
                | Command::Opts { .. }
                | Command::Noop
                | Command::Syst
                | Command::Type { .. }
                | Command::Pbsz { .. }
                | Command::Prot { .. }
        )
    }

    /// Commands whose payload travels over the data channel.
    pub fn is_transfer(&self) -> bool {
        matches!(
            self,
            Command::List { .. } | Command::Nlst { .. } | Command::Retr { .. } | Command::Stor { .. } | Command::Appe { .. }
        )
    }

    /// Transfer commands refused with 425 when neither PORT nor PASV was
    /// received. RETR is absent: it reports on its source file before the
    /// data channel comes into play.
    pub fn requires_data_chan(&self) -> bool {
        matches!(
            self,
            Command::List { .. } | Command::Nlst { .. } | Command::Stor { .. } | Command::Appe { .. }
        )
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

fn strip_eol(line: &str) -> Result<&str> {
    if let Some(stripped) = line.strip_suffix("\r\n") {
        return Ok(stripped);
    }
    match line.strip_suffix('\n') {
        // Not all clients include the (actually mandatory) '\r'
        Some(stripped) if !stripped.ends_with('\r') => Ok(stripped),
        _ => Err(ParseErrorKind::InvalidEol.into()),
    }
}

fn required(arg: String) -> Result<String> {
    if arg.is_empty() {
        return Err(ParseErrorKind::InvalidCommand.into());
    }
    Ok(arg)
}

fn optional(arg: String) -> Option<String> {
    if arg.is_empty() {
        None
    } else {
        Some(arg)
    }
}

fn no_arg(arg: &str) -> Result<()> {
    if !arg.is_empty() {
        return Err(ParseErrorKind::InvalidCommand.into());
    }
    Ok(())
}

fn parse_type(arg: &str) -> Result<TypeParam> {
    match arg.to_uppercase().as_str() {
        "I" => Ok(TypeParam::Image),
        "A" | "A N" => Ok(TypeParam::Ascii),
        _ => Ok(TypeParam::Other),
    }
}

fn parse_auth(arg: &str) -> Result<AuthParam> {
    match arg.to_uppercase().as_str() {
        "TLS" => Ok(AuthParam::Tls),
        "SSL" => Ok(AuthParam::Ssl),
        _ => Err(ParseErrorKind::InvalidCommand.into()),
    }
}

fn parse_prot(arg: &str) -> Result<ProtParam> {
    match arg.to_uppercase().as_str() {
        "C" => Ok(ProtParam::Clear),
        "S" => Ok(ProtParam::Safe),
        "E" => Ok(ProtParam::Confidential),
        "P" => Ok(ProtParam::Private),
        _ => Err(ParseErrorKind::InvalidCommand.into()),
    }
}

// PORT h1,h2,h3,h4,p1,p2 with port = p1 << 8 | p2
fn parse_port_arg(arg: &str) -> Result<SocketAddrV4> {
    let parts: Vec<u8> = arg
        .split(',')
        .map(|p| p.parse::<u8>())
        .collect::<std::result::Result<Vec<u8>, _>>()
        .map_err(|_| ParseErrorKind::InvalidCommand)?;
    if parts.len() != 6 {
        return Err(ParseErrorKind::InvalidCommand.into());
    }
    let ip = Ipv4Addr::new(parts[0], parts[1], parts[2], parts[3]);
    let port = (u16::from(parts[4]) << 8) | u16::from(parts[5]);
    if port == 0 {
        return Err(ParseErrorKind::InvalidCommand.into());
    }
    Ok(SocketAddrV4::new(ip, port))
}

// EPRT |1|h|p| where the first character picks the delimiter. Only address
// family 1 (IPv4) is served.
fn parse_eprt_arg(arg: &str) -> Result<SocketAddrV4> {
    let delim = arg.chars().next().ok_or(ParseErrorKind::InvalidCommand)?;
    let fields: Vec<&str> = arg.trim_matches(delim).split(delim).collect();
    if fields.len() != 3 {
        return Err(ParseErrorKind::InvalidCommand.into());
    }
    match fields[0] {
        "1" => {}
        "2" => return Err(ParseErrorKind::UnsupportedProtocolFamily.into()),
        _ => return Err(ParseErrorKind::InvalidCommand.into()),
    }
    let ip: Ipv4Addr = fields[1].parse().map_err(|_| ParseErrorKind::InvalidCommand)?;
    let port: u32 = fields[2].parse().map_err(|_| ParseErrorKind::InvalidCommand)?;
    if port == 0 || port > u32::from(u16::MAX) {
        return Err(ParseErrorKind::InvalidCommand.into());
    }
    Ok(SocketAddrV4::new(ip, port as u16))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::controlchan::parse_error::{ParseError, ParseErrorKind};
    use pretty_assertions::assert_eq;

    #[test]
    fn parse_user_cmd_crnl() {
        let input = "USER Dolores\r\n";
        assert_eq!(Command::parse(input).unwrap(), Command::User { username: "Dolores".into() });
    }

    #[test]
    fn parse_user_cmd_mixed_case() {
        let input = "uSeR Dolores\r\n";
        assert_eq!(Command::parse(input).unwrap(), Command::User { username: "Dolores".into() });
    }

    #[test]
    // Not all clients include the (actually mandatory) '\r'
    fn parse_user_cmd_nl() {
        let input = "USER Dolores\n";
        assert_eq!(Command::parse(input).unwrap(), Command::User { username: "Dolores".into() });
    }

    #[test]
    // We won't accept requests ending only in '\r'
    fn parse_user_cmd_cr() {
        let input = "USER Dolores\r";
        assert_eq!(Command::parse(input), Err(ParseError::from(ParseErrorKind::InvalidEol)));
    }

    #[test]
    fn parse_user_cmd_no_eol() {
        let input = "USER Dolores";
        assert_eq!(Command::parse(input), Err(ParseError::from(ParseErrorKind::InvalidEol)));
    }

    #[test]
    // The argument is trimmed of surrounding whitespace
    fn parse_user_cmd_double_space() {
        let input = "USER  Dolores\r\n";
        assert_eq!(Command::parse(input).unwrap(), Command::User { username: "Dolores".into() });
    }

    #[test]
    fn parse_user_cmd_internal_whitespace() {
        let input = "USER Dolores Abernathy\r\n";
        assert_eq!(
            Command::parse(input).unwrap(),
            Command::User {
                username: "Dolores Abernathy".into()
            }
        );
    }

    #[test]
    fn parse_pass_cmd() {
        let input = "PASS s3cr3t\r\n";
        assert_eq!(
            Command::parse(input).unwrap(),
            Command::Pass {
                password: Password::new("s3cr3t")
            }
        );

        let input = "PASS\r\n";
        assert_eq!(Command::parse(input), Err(ParseError::from(ParseErrorKind::InvalidCommand)));
    }

    #[test]
    fn parse_noop() {
        let input = "NOOP\r\n";
        assert_eq!(Command::parse(input).unwrap(), Command::Noop);

        let input = "NOOP bla\r\n";
        assert_eq!(Command::parse(input), Err(ParseError::from(ParseErrorKind::InvalidCommand)));
    }

    #[test]
    fn parse_pasv() {
        let input = "PASV\r\n";
        assert_eq!(Command::parse(input).unwrap(), Command::Pasv);

        let input = "PASV bla\r\n";
        assert_eq!(Command::parse(input), Err(ParseError::from(ParseErrorKind::InvalidCommand)));
    }

    #[test]
    fn parse_epsv() {
        let input = "EPSV\r\n";
        assert_eq!(Command::parse(input).unwrap(), Command::Epsv);
    }

    #[test]
    fn parse_port() {
        let input = "PORT 127,0,0,1,20,0\r\n";
        assert_eq!(
            Command::parse(input).unwrap(),
            Command::Port {
                addr: "127.0.0.1:5120".parse().unwrap()
            }
        );

        let input = "PORT\r\n";
        assert_eq!(Command::parse(input), Err(ParseError::from(ParseErrorKind::InvalidCommand)));

        let input = "PORT a1,a2,a3,a4,p1,p2\r\n";
        assert_eq!(Command::parse(input), Err(ParseError::from(ParseErrorKind::InvalidCommand)));

        let input = "PORT 127,0,0,1,20\r\n";
        assert_eq!(Command::parse(input), Err(ParseError::from(ParseErrorKind::InvalidCommand)));

        // port zero is not a usable data port
        let input = "PORT 127,0,0,1,0,0\r\n";
        assert_eq!(Command::parse(input), Err(ParseError::from(ParseErrorKind::InvalidCommand)));

        // octets must fit a byte
        let input = "PORT 300,0,0,1,20,0\r\n";
        assert_eq!(Command::parse(input), Err(ParseError::from(ParseErrorKind::InvalidCommand)));
    }

    #[test]
    fn parse_eprt() {
        let input = "EPRT |1|132.235.1.2|6275|\r\n";
        assert_eq!(
            Command::parse(input).unwrap(),
            Command::Eprt {
                addr: "132.235.1.2:6275".parse().unwrap()
            }
        );

        let input = "EPRT |2|1080::8:800:200C:417A|5282|\r\n";
        assert_eq!(Command::parse(input), Err(ParseError::from(ParseErrorKind::UnsupportedProtocolFamily)));

        let input = "EPRT |1|132.235.1.2|0|\r\n";
        assert_eq!(Command::parse(input), Err(ParseError::from(ParseErrorKind::InvalidCommand)));

        let input = "EPRT |1|132.235.1.2|70000|\r\n";
        assert_eq!(Command::parse(input), Err(ParseError::from(ParseErrorKind::InvalidCommand)));

        let input = "EPRT |1|132.235.1.2|\r\n";
        assert_eq!(Command::parse(input), Err(ParseError::from(ParseErrorKind::InvalidCommand)));
    }

    #[test]
    fn parse_retr_stor_appe() {
        assert_eq!(Command::parse("RETR a/file.txt\r\n").unwrap(), Command::Retr { path: "a/file.txt".into() });
        assert_eq!(Command::parse("STOR x.bin\r\n").unwrap(), Command::Stor { path: "x.bin".into() });
        assert_eq!(Command::parse("APPE log.txt\r\n").unwrap(), Command::Appe { path: "log.txt".into() });
        assert_eq!(Command::parse("RETR\r\n"), Err(ParseError::from(ParseErrorKind::InvalidCommand)));
    }

    #[test]
    fn parse_list() {
        struct Test {
            input: &'static str,
            expected_arg: Option<&'static str>,
        }

        let tests = [
            Test {
                input: "LIST\r\n",
                expected_arg: None,
            },
            Test {
                input: "LIST tmp\r\n",
                expected_arg: Some("tmp"),
            },
            Test {
                input: "LIST -la\r\n",
                expected_arg: Some("-la"),
            },
            Test {
                input: "LIST -la tmp*\r\n",
                expected_arg: Some("-la tmp*"),
            },
        ];

        for test in tests.iter() {
            assert_eq!(
                Command::parse(test.input),
                Ok(Command::List {
                    arg: test.expected_arg.map(|s| s.to_string()),
                })
            );
        }
    }

    #[test]
    fn parse_type_params() {
        assert_eq!(Command::parse("TYPE I\r\n").unwrap(), Command::Type { param: TypeParam::Image });
        assert_eq!(Command::parse("TYPE A\r\n").unwrap(), Command::Type { param: TypeParam::Ascii });
        assert_eq!(Command::parse("TYPE a\r\n").unwrap(), Command::Type { param: TypeParam::Ascii });
        assert_eq!(Command::parse("TYPE E\r\n").unwrap(), Command::Type { param: TypeParam::Other });
        assert_eq!(Command::parse("TYPE\r\n"), Err(ParseError::from(ParseErrorKind::InvalidCommand)));
    }

    #[test]
    fn parse_feat_pwd_quit() {
        assert_eq!(Command::parse("FEAT\r\n"), Ok(Command::Feat));
        assert_eq!(Command::parse("PWD\r\n"), Ok(Command::Pwd));
        assert_eq!(Command::parse("XPWD\r\n"), Ok(Command::Pwd));
        assert_eq!(Command::parse("QUIT\r\n"), Ok(Command::Quit));
        assert_eq!(Command::parse("QUIT NOW\r\n"), Err(ParseError::from(ParseErrorKind::InvalidCommand)));
    }

    #[test]
    fn parse_cwd_mkd_rmd_dele() {
        assert_eq!(Command::parse("CWD /tmp\r\n"), Ok(Command::Cwd { path: "/tmp".into() }));
        assert_eq!(Command::parse("MKD bla\r\n"), Ok(Command::Mkd { path: "bla".into() }));
        assert_eq!(Command::parse("RMD bla\r\n"), Ok(Command::Rmd { path: "bla".into() }));
        assert_eq!(Command::parse("DELE some_file\r\n"), Ok(Command::Dele { path: "some_file".into() }));
        assert_eq!(Command::parse("CWD\r\n"), Err(ParseError::from(ParseErrorKind::InvalidCommand)));
    }

    #[test]
    fn parse_rnfr_rnto() {
        assert_eq!(Command::parse("RNFR dir/file\r\n"), Ok(Command::Rnfr { path: "dir/file".into() }));
        assert_eq!(
            Command::parse("RNTO name with spaces\r\n"),
            Ok(Command::Rnto {
                path: "name with spaces".into()
            })
        );
        assert_eq!(Command::parse("RNFR\r\n"), Err(ParseError::from(ParseErrorKind::InvalidCommand)));
    }

    #[test]
    fn parse_auth_params() {
        assert_eq!(Command::parse("AUTH TLS\r\n"), Ok(Command::Auth { protocol: AuthParam::Tls }));
        assert_eq!(Command::parse("AUTH tls\r\n"), Ok(Command::Auth { protocol: AuthParam::Tls }));
        assert_eq!(Command::parse("AUTH SSL\r\n"), Ok(Command::Auth { protocol: AuthParam::Ssl }));
        assert_eq!(Command::parse("AUTH xx\r\n"), Err(ParseError::from(ParseErrorKind::InvalidCommand)));
    }

    #[test]
    fn parse_pbsz_prot() {
        assert_eq!(Command::parse("PBSZ 0\r\n"), Ok(Command::Pbsz { size: 0 }));
        assert_eq!(Command::parse("PBSZ 1024\r\n"), Ok(Command::Pbsz { size: 1024 }));
        assert_eq!(Command::parse("PBSZ x\r\n"), Err(ParseError::from(ParseErrorKind::InvalidCommand)));

        assert_eq!(Command::parse("PROT P\r\n"), Ok(Command::Prot { param: ProtParam::Private }));
        assert_eq!(Command::parse("PROT C\r\n"), Ok(Command::Prot { param: ProtParam::Clear }));
        assert_eq!(Command::parse("PROT X\r\n"), Err(ParseError::from(ParseErrorKind::InvalidCommand)));
    }

    #[test]
    fn parse_size_mdtm() {
        assert_eq!(Command::parse("SIZE file.txt\r\n"), Ok(Command::Size { path: "file.txt".into() }));
        assert_eq!(Command::parse("MDTM file.txt\r\n"), Ok(Command::Mdtm { path: "file.txt".into() }));
        assert_eq!(Command::parse("MDTM\r\n"), Err(ParseError::from(ParseErrorKind::InvalidCommand)));
    }

    #[test]
    fn parse_unknown_command() {
        assert_eq!(
            Command::parse("SITE CHMOD 755 x\r\n"),
            Err(ParseError::from(ParseErrorKind::UnknownCommand { command: "SITE".into() }))
        );
        assert_eq!(
            Command::parse("REST 1024\r\n"),
            Err(ParseError::from(ParseErrorKind::UnknownCommand { command: "REST".into() }))
        );
    }

    #[test]
    fn classification_sets() {
        assert!(Command::Feat.is_exempt_from_auth());
        assert!(Command::parse("PBSZ 0\r\n").unwrap().is_exempt_from_auth());
        assert!(!Command::Pwd.is_exempt_from_auth());
        assert!(!Command::parse("LIST\r\n").unwrap().is_exempt_from_auth());

        assert!(Command::parse("RETR x\r\n").unwrap().is_transfer());
        assert!(!Command::parse("RETR x\r\n").unwrap().requires_data_chan());
        assert!(Command::parse("STOR x\r\n").unwrap().requires_data_chan());
        assert!(Command::parse("LIST\r\n").unwrap().requires_data_chan());
    }
}
