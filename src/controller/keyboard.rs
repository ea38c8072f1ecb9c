// Copyright (C) 2025 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::io;
use std::path::PathBuf;
use std::thread;

use crossbeam_channel::Sender;
use tracing::{info, span, warn, Level};

use super::Event;

const PLAY: &str = "play";
const STOP: &str = "stop";
const SET: &str = "set";
const SYNC: &str = "sync";
const TOUCH: &str = "touch";
const RELEASE: &str = "release";
const APPLY: &str = "apply";
const SAVE: &str = "save";
const LOAD: &str = "load";
const RESET: &str = "reset";
const VOLUME: &str = "volume";
const STATUS: &str = "status";
const QUIT: &str = "quit";

/// A controller that drives the player from keyboard commands.
pub struct Driver {}

impl Driver {
    pub fn new() -> Driver {
        Driver {}
    }

    /// Parses one command line. Unparsable input yields nothing.
    fn parse(input: &str) -> Option<Event> {
        let mut tokens = input.split_whitespace();
        let command = tokens.next()?.to_lowercase();
        let rest: Vec<&str> = tokens.collect();

        match (command.as_str(), rest.as_slice()) {
            (PLAY, []) => Some(Event::Play),
            (STOP, []) => Some(Event::Stop),
            (SET, [channel, column, value]) => Some(Event::SetCell {
                channel: channel.parse().ok()?,
                column: column.parse().ok()?,
                value: value.parse().ok()?,
            }),
            (SYNC, [column, state]) => Some(Event::Sync {
                column: column.parse().ok()?,
                enabled: match *state {
                    "on" => true,
                    "off" => false,
                    _ => return None,
                },
            }),
            (TOUCH, [value]) => Some(Event::SetTouchThreshold(value.parse().ok()?)),
            (RELEASE, [value]) => Some(Event::SetReleaseThreshold(value.parse().ok()?)),
            (APPLY, []) => Some(Event::Apply),
            (SAVE, [path]) => Some(Event::Save(PathBuf::from(path))),
            (LOAD, [path]) => Some(Event::Load(PathBuf::from(path))),
            (RESET, []) => Some(Event::Reset),
            (VOLUME, [percent]) => Some(Event::Volume(percent.parse().ok()?)),
            (STATUS, []) => Some(Event::Status),
            (QUIT, []) => Some(Event::Quit),
            _ => None,
        }
    }

    fn monitor_io<R, W>(
        events_tx: &Sender<Event>,
        mut reader: R,
        mut writer: W,
    ) -> Result<(), io::Error>
    where
        R: io::BufRead,
        W: io::Write,
    {
        write!(
            writer,
            "Command ({}, {}, {} <ch> <col> <value>, {} <col> on|off, {} <value>, {} <value>, {}, {} <path>, {} <path>, {}, {} <percent>, {}, {}): ",
            PLAY, STOP, SET, SYNC, TOUCH, RELEASE, APPLY, SAVE, LOAD, RESET, VOLUME, STATUS, QUIT,
        )?;
        writer.flush()?;
        let mut input: String = String::default();
        reader.read_line(&mut input)?;

        match Self::parse(&input) {
            Some(event) => events_tx
                .send(event)
                .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?,
            None => warn!(input = input.trim(), "Unrecognized input"),
        }
        Ok(())
    }
}

impl super::Driver for Driver {
    fn monitor_events(&self, events_tx: Sender<Event>) -> thread::JoinHandle<Result<(), io::Error>> {
        thread::spawn(move || {
            let span = span!(Level::INFO, "keyboard driver");
            let _enter = span.enter();

            info!("Keyboard driver started.");

            loop {
                Self::monitor_io(&events_tx, io::stdin().lock(), io::stdout())?;
            }
        })
    }
}

#[cfg(test)]
mod test {
    use std::io::{self, BufReader, BufWriter};
    use std::path::PathBuf;

    use crate::controller::Event;

    use super::Driver;

    fn get_event(input: &str) -> Result<Option<Event>, io::Error> {
        let (sender, receiver) = crossbeam_channel::unbounded::<Event>();

        let reader = BufReader::new(input.as_bytes());
        let writer = BufWriter::new(vec![0u8; 255]);
        Driver::monitor_io(&sender, reader, writer)?;

        // Force the sender to close.
        drop(sender);
        Ok(receiver.try_recv().ok())
    }

    #[test]
    fn test_keyboard_events() -> Result<(), io::Error> {
        assert_eq!(Event::Play, get_event("play")?.unwrap());
        assert_eq!(Event::Stop, get_event("stop")?.unwrap());
        assert_eq!(
            Event::SetCell {
                channel: 1,
                column: 22,
                value: -7
            },
            get_event("set 1 22 -7")?.unwrap()
        );
        assert_eq!(
            Event::Sync {
                column: 3,
                enabled: true
            },
            get_event("sync 3 on")?.unwrap()
        );
        assert_eq!(
            Event::Sync {
                column: 3,
                enabled: false
            },
            get_event("sync 3 off")?.unwrap()
        );
        assert_eq!(Event::SetTouchThreshold(45), get_event("touch 45")?.unwrap());
        assert_eq!(
            Event::SetReleaseThreshold(15),
            get_event("release 15")?.unwrap()
        );
        assert_eq!(Event::Apply, get_event("apply")?.unwrap());
        assert_eq!(
            Event::Save(PathBuf::from("config.json")),
            get_event("save config.json")?.unwrap()
        );
        assert_eq!(
            Event::Load(PathBuf::from("config.json")),
            get_event("load config.json")?.unwrap()
        );
        assert_eq!(Event::Reset, get_event("reset")?.unwrap());
        assert_eq!(Event::Volume(75), get_event("volume 75")?.unwrap());
        assert_eq!(Event::Status, get_event("status")?.unwrap());
        assert_eq!(Event::Quit, get_event("quit")?.unwrap());

        // Unparsable input is rejected without an event.
        assert_eq!(None, get_event("unrecognized")?);
        assert_eq!(None, get_event("set 1 2")?);
        assert_eq!(None, get_event("set a b c")?);
        assert_eq!(None, get_event("sync 3 maybe")?);
        assert_eq!(None, get_event("")?);
        Ok(())
    }
}
