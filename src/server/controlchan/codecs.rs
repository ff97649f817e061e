use super::{command::Command, error::ControlChanError, Reply};

use bytes::BytesMut;
use std::io::Write;
use tokio_util::codec::{Decoder, Encoder};

// FtpCodec implements tokio's `Decoder` and `Encoder` traits for the control
// channel, decoding FTP commands and encoding their replies.
pub struct FtpCodec {
    // Stored index of the next index to examine for a '\n' character. This
    // is used to optimize searching. For example, if `decode` was called
    // with `abc`, it would hold `3`, because that is the next index to
    // examine. The next time `decode` is called with `abcde\n`, we will
    // only look at `de\n` before returning.
    next_index: usize,
}

impl FtpCodec {
    pub fn new() -> Self {
        FtpCodec { next_index: 0 }
    }
}

impl Decoder for FtpCodec {
    type Item = Command;
    type Error = ControlChanError;

    // Decode the incoming bytes into a meaningful command: split on
    // newlines and parse the resulting line with `Command::parse`.
    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Command>, Self::Error> {
        if let Some(newline_offset) = buf[self.next_index..].iter().position(|b| *b == b'\n') {
            let newline_index = newline_offset + self.next_index;
            let line = buf.split_to(newline_index + 1);
            self.next_index = 0;
            Ok(Some(Command::parse(line)?))
        } else {
            self.next_index = buf.len();
            Ok(None)
        }
    }
}

impl Encoder<Reply> for FtpCodec {
    type Error = ControlChanError;

    // Encode the outgoing reply. All text is UTF-8 already; never apply a
    // stream encoding here or TLS framing would be mangled.
    fn encode(&mut self, reply: Reply, buf: &mut BytesMut) -> Result<(), Self::Error> {
        let mut buffer = vec![];
        match reply {
            Reply::None => {
                return Ok(());
            }
            Reply::CodeAndMsg { code, msg } => {
                if msg.is_empty() {
                    writeln!(buffer, "{}\r", code as u32)?;
                } else {
                    writeln!(buffer, "{} {}\r", code as u32, msg)?;
                }
            }
            Reply::MultiLine { code, mut lines } => {
                let last_line = lines.pop().unwrap_or_default();

                // Continuation lines starting with a digit could be read as
                // a status code, indent them.
                for it in lines.iter_mut() {
                    if it.chars().next().map(|c| c.is_ascii_digit()).unwrap_or(false) {
                        it.insert(0, ' ');
                    }
                }
                if lines.is_empty() {
                    writeln!(buffer, "{} {}\r", code as u32, last_line)?;
                } else {
                    write!(buffer, "{}-{}\r\n{} {}\r\n", code as u32, lines.join("\r\n"), code as u32, last_line)?;
                }
            }
        }
        buf.extend(&buffer);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::controlchan::ReplyCode;
    use pretty_assertions::assert_eq;

    fn encoded(reply: Reply) -> String {
        let mut codec = FtpCodec::new();
        let mut buf = BytesMut::new();
        codec.encode(reply, &mut buf).unwrap();
        String::from_utf8(buf.to_vec()).unwrap()
    }

    #[test]
    fn encode_single_line() {
        assert_eq!(encoded(Reply::new(ReplyCode::CommandOkay, "OK")), "200 OK\r\n");
    }

    #[test]
    fn encode_no_reply() {
        assert_eq!(encoded(Reply::none()), "");
    }

    #[test]
    fn encode_multi_line() {
        let reply = Reply::new_multiline(ReplyCode::SystemStatus, vec!["Features:", " SIZE", " UTF8", "End"]);
        assert_eq!(encoded(reply), "211-Features:\r\n SIZE\r\n UTF8\r\n211 End\r\n");
    }

    #[test]
    fn encode_multi_line_indents_digit_lines() {
        let reply = Reply::new_multiline(ReplyCode::FileStatus, vec!["Status follows", "123 file", "End of status"]);
        assert_eq!(encoded(reply), "213-Status follows\r\n 123 file\r\n213 End of status\r\n");
    }

    #[test]
    fn decode_one_command_per_line() {
        let mut codec = FtpCodec::new();
        let mut buf = BytesMut::from(&b"NOOP\r\nQUI"[..]);

        assert_eq!(codec.decode(&mut buf).unwrap(), Some(Command::Noop));
        assert_eq!(codec.decode(&mut buf).unwrap(), None);

        buf.extend_from_slice(b"T\r\n");
        assert_eq!(codec.decode(&mut buf).unwrap(), Some(Command::Quit));
    }
}
