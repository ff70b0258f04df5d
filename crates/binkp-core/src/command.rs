//! The BinkP command vocabulary.
//!
//! Command frames carry a one-byte command id followed by ASCII arguments,
//! space-delimited when multi-field. [`Command`] is the parsed form the
//! session works with; [`Command::into_frame`] and [`Command::parse`] move
//! between it and the raw frame payload.

use std::fmt;

use crate::error::FrameError;
use crate::frame::{Frame, FrameKind};

/// Raw command ids as they appear on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CommandId {
    /// Free-form informational record (`SYS`, `ZYZ`, `LOC`, `OPT`, ...).
    Nul = 0,
    /// One or more space-separated FTN addresses.
    Adr = 1,
    /// Password or `CRAM-MD5-<hex-digest>` response.
    Pwd = 2,
    /// File announcement: `name size mtime offset`.
    File = 3,
    /// Session authenticated.
    Ok = 4,
    /// End of batch.
    Eob = 5,
    /// File accepted: `name size mtime`.
    Got = 6,
    /// Fatal error, free-form text.
    Err = 7,
    /// Remote busy, transient.
    Bsy = 8,
    /// Resume request: `name size mtime offset`.
    Get = 9,
    /// Skip request: `name size mtime`.
    Skip = 10,
}

impl TryFrom<u8> for CommandId {
    type Error = FrameError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Nul),
            1 => Ok(Self::Adr),
            2 => Ok(Self::Pwd),
            3 => Ok(Self::File),
            4 => Ok(Self::Ok),
            5 => Ok(Self::Eob),
            6 => Ok(Self::Got),
            7 => Ok(Self::Err),
            8 => Ok(Self::Bsy),
            9 => Ok(Self::Get),
            10 => Ok(Self::Skip),
            other => Err(FrameError::UnknownCommand(other)),
        }
    }
}

impl fmt::Display for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Nul => "M_NUL",
            Self::Adr => "M_ADR",
            Self::Pwd => "M_PWD",
            Self::File => "M_FILE",
            Self::Ok => "M_OK",
            Self::Eob => "M_EOB",
            Self::Got => "M_GOT",
            Self::Err => "M_ERR",
            Self::Bsy => "M_BSY",
            Self::Get => "M_GET",
            Self::Skip => "M_SKIP",
        };
        f.write_str(name)
    }
}

/// `M_FILE` / `M_GET` payload: a named byte stream plus a starting offset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    /// File name as declared by the sender.
    pub name: String,
    /// Declared size in bytes.
    pub size: u64,
    /// Unix modification time.
    pub mtime: i64,
    /// Starting offset; 0 for a fresh transfer.
    pub offset: u64,
}

/// `M_GOT` / `M_SKIP` payload: the file being acknowledged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRef {
    /// File name as announced.
    pub name: String,
    /// Declared size in bytes.
    pub size: u64,
    /// Unix modification time.
    pub mtime: i64,
}

impl FileInfo {
    /// The acknowledgement form of this announcement.
    #[must_use]
    pub fn to_ref(&self) -> FileRef {
        FileRef {
            name: self.name.clone(),
            size: self.size,
            mtime: self.mtime,
        }
    }
}

/// A parsed command frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `M_NUL` informational record.
    Nul(String),
    /// `M_ADR`, raw address list (session picks the first parseable entry).
    Adr(String),
    /// `M_PWD` password or CRAM response.
    Pwd(String),
    /// `M_FILE` announcement.
    File(FileInfo),
    /// `M_OK`, optional mode text.
    Ok(String),
    /// `M_EOB`.
    Eob,
    /// `M_GOT` acknowledgement.
    Got(FileRef),
    /// `M_ERR` fatal error text.
    Err(String),
    /// `M_BSY` busy text.
    Bsy(String),
    /// `M_GET` resume request.
    Get(FileInfo),
    /// `M_SKIP` skip request.
    Skip(FileRef),
}

impl Command {
    /// The wire id of this command.
    #[must_use]
    pub fn id(&self) -> CommandId {
        match self {
            Self::Nul(_) => CommandId::Nul,
            Self::Adr(_) => CommandId::Adr,
            Self::Pwd(_) => CommandId::Pwd,
            Self::File(_) => CommandId::File,
            Self::Ok(_) => CommandId::Ok,
            Self::Eob => CommandId::Eob,
            Self::Got(_) => CommandId::Got,
            Self::Err(_) => CommandId::Err,
            Self::Bsy(_) => CommandId::Bsy,
            Self::Get(_) => CommandId::Get,
            Self::Skip(_) => CommandId::Skip,
        }
    }

    /// Render into a command frame (`id` byte plus ASCII arguments).
    #[must_use]
    pub fn into_frame(self) -> Frame {
        let args = match &self {
            Self::Nul(s) | Self::Adr(s) | Self::Pwd(s) | Self::Ok(s) | Self::Err(s)
            | Self::Bsy(s) => s.clone(),
            Self::Eob => String::new(),
            Self::File(f) | Self::Get(f) => {
                format!("{} {} {} {}", f.name, f.size, f.mtime, f.offset)
            }
            Self::Got(r) | Self::Skip(r) => format!("{} {} {}", r.name, r.size, r.mtime),
        };
        let mut payload = Vec::with_capacity(1 + args.len());
        payload.push(self.id() as u8);
        payload.extend_from_slice(args.as_bytes());
        Frame::command(payload)
    }

    /// Parse a command frame payload (first byte is the command id).
    ///
    /// # Errors
    ///
    /// [`FrameError::EmptyCommand`] on a zero-length payload,
    /// [`FrameError::UnknownCommand`] for ids outside the vocabulary, and
    /// [`FrameError::BadArguments`] when the arguments do not match the
    /// command's payload shape.
    pub fn parse(payload: &[u8]) -> Result<Self, FrameError> {
        let (&id, args) = payload.split_first().ok_or(FrameError::EmptyCommand)?;
        let id = CommandId::try_from(id)?;
        let args = std::str::from_utf8(args)
            .map_err(|_| FrameError::BadArguments("command", "non-UTF8 arguments".to_owned()))?;

        Ok(match id {
            CommandId::Nul => Self::Nul(args.to_owned()),
            CommandId::Adr => Self::Adr(args.to_owned()),
            CommandId::Pwd => Self::Pwd(args.to_owned()),
            CommandId::Ok => Self::Ok(args.to_owned()),
            CommandId::Err => Self::Err(args.to_owned()),
            CommandId::Bsy => Self::Bsy(args.to_owned()),
            CommandId::Eob => Self::Eob,
            CommandId::File => Self::File(parse_file_info("M_FILE", args)?),
            CommandId::Get => Self::Get(parse_file_info("M_GET", args)?),
            CommandId::Got => Self::Got(parse_file_ref("M_GOT", args)?),
            CommandId::Skip => Self::Skip(parse_file_ref("M_SKIP", args)?),
        })
    }
}

fn parse_file_info(what: &'static str, args: &str) -> Result<FileInfo, FrameError> {
    let mut fields = args.split_whitespace();
    let (name, size, mtime, offset) = (fields.next(), fields.next(), fields.next(), fields.next());
    match (name, size, mtime, offset) {
        (Some(name), Some(size), Some(mtime), Some(offset)) => Ok(FileInfo {
            name: name.to_owned(),
            size: parse_num(what, size, args)?,
            mtime: parse_num(what, mtime, args)?,
            offset: parse_num(what, offset, args)?,
        }),
        _ => Err(FrameError::BadArguments(what, args.to_owned())),
    }
}

fn parse_file_ref(what: &'static str, args: &str) -> Result<FileRef, FrameError> {
    let mut fields = args.split_whitespace();
    let (name, size, mtime) = (fields.next(), fields.next(), fields.next());
    match (name, size, mtime) {
        (Some(name), Some(size), Some(mtime)) => Ok(FileRef {
            name: name.to_owned(),
            size: parse_num(what, size, args)?,
            mtime: parse_num(what, mtime, args)?,
        }),
        _ => Err(FrameError::BadArguments(what, args.to_owned())),
    }
}

fn parse_num<T: std::str::FromStr>(
    what: &'static str,
    field: &str,
    args: &str,
) -> Result<T, FrameError> {
    field
        .parse()
        .map_err(|_| FrameError::BadArguments(what, args.to_owned()))
}

/// Split a frame into either a parsed command or the data payload.
///
/// # Errors
///
/// Propagates [`Command::parse`] failures for command frames.
pub fn classify(frame: Frame) -> Result<Received, FrameError> {
    match frame.kind {
        FrameKind::Command => Ok(Received::Command(Command::parse(&frame.payload)?)),
        FrameKind::Data => Ok(Received::Data(frame.payload)),
    }
}

/// A frame after classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Received {
    /// Parsed command frame.
    Command(Command),
    /// Data frame payload.
    Data(Vec<u8>),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reparse(cmd: Command) -> Command {
        let frame = cmd.into_frame();
        assert_eq!(frame.kind, FrameKind::Command);
        Command::parse(&frame.payload).unwrap()
    }

    #[test]
    fn file_roundtrip() {
        let cmd = Command::File(FileInfo {
            name: "echo_1.pkt".to_owned(),
            size: 5,
            mtime: 0,
            offset: 0,
        });
        assert_eq!(reparse(cmd.clone()), cmd);
    }

    #[test]
    fn file_wire_form() {
        let frame = Command::File(FileInfo {
            name: "echo_1.pkt".to_owned(),
            size: 5,
            mtime: 1700000000,
            offset: 512,
        })
        .into_frame();
        assert_eq!(frame.payload[0], 3);
        assert_eq!(&frame.payload[1..], b"echo_1.pkt 5 1700000000 512");
    }

    #[test]
    fn eob_is_bare() {
        let frame = Command::Eob.into_frame();
        assert_eq!(frame.payload, vec![5]);
        assert_eq!(Command::parse(&[5]).unwrap(), Command::Eob);
    }

    #[test]
    fn got_skip_roundtrip() {
        let r = FileRef {
            name: "dup".to_owned(),
            size: 10,
            mtime: 0,
        };
        assert_eq!(reparse(Command::Got(r.clone())), Command::Got(r.clone()));
        assert_eq!(reparse(Command::Skip(r.clone())), Command::Skip(r));
    }

    #[test]
    fn text_commands_roundtrip() {
        for cmd in [
            Command::Nul("SYS Example BBS".to_owned()),
            Command::Adr("2:5020/1042.0 2:5020/1042.1@fidonet".to_owned()),
            Command::Pwd(String::new()),
            Command::Ok("secure".to_owned()),
            Command::Err("bad password".to_owned()),
            Command::Bsy("try later".to_owned()),
        ] {
            assert_eq!(reparse(cmd.clone()), cmd);
        }
    }

    #[test]
    fn rejects_unknown_id() {
        assert!(matches!(
            Command::parse(&[11]),
            Err(FrameError::UnknownCommand(11))
        ));
        assert!(matches!(
            Command::parse(&[0xFF]),
            Err(FrameError::UnknownCommand(0xFF))
        ));
    }

    #[test]
    fn rejects_empty_payload() {
        assert!(matches!(
            Command::parse(&[]),
            Err(FrameError::EmptyCommand)
        ));
    }

    #[test]
    fn rejects_malformed_file_args() {
        for args in ["", "name", "name 5", "name 5 0", "name x 0 0", "name 5 0 y"] {
            let mut payload = vec![3u8];
            payload.extend_from_slice(args.as_bytes());
            assert!(
                matches!(
                    Command::parse(&payload),
                    Err(FrameError::BadArguments("M_FILE", _))
                ),
                "accepted {args:?}"
            );
        }
    }

    #[test]
    fn negative_mtime_accepted() {
        let mut payload = vec![3u8];
        payload.extend_from_slice(b"old.pkt 5 -1 0");
        let cmd = Command::parse(&payload).unwrap();
        assert_eq!(
            cmd,
            Command::File(FileInfo {
                name: "old.pkt".to_owned(),
                size: 5,
                mtime: -1,
                offset: 0,
            })
        );
    }
}
