//! # Flight Listing and Download
//!
//! Asks a device which flights its eeprom holds, then pulls each flight's
//! blocks as hex dumps.

use serde::Serialize;
use tracing::{debug, info, warn};

use super::config_data::ConfigData;
use crate::error::{AltosError, Result};
use crate::link::Link;

/// Bytes per eeprom block
pub const EEPROM_BLOCK_SIZE: usize = 256;

/// Data bytes per hex dump line
const DUMP_BYTES_PER_LINE: usize = 16;

/// One stored flight; `start` and `end` are block numbers, end exclusive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EepromFlight {
    pub flight: u16,
    pub start: u32,
    pub end: u32,
}

impl EepromFlight {
    pub fn blocks(&self) -> std::ops::Range<u32> {
        self.start..self.end
    }
}

/// Flights stored on one device
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EepromList {
    pub config: ConfigData,
    pub flights: Vec<EepromFlight>,
}

/// Outcome of parsing one listing line
#[derive(Debug, PartialEq, Eq)]
enum ListLine {
    Flight(EepromFlight),
    /// Recognised but unusable (flight 0, empty range)
    Dropped,
    /// Fewer than six tokens: the listing is over
    End,
}

fn parse_hex_u32(token: &str) -> Result<u32> {
    u32::from_str_radix(token, 16).map_err(|e| AltosError::Parse(format!("bad hex {:?}: {}", token, e)))
}

/// Parse `flight N start HEX end HEX`
fn parse_list_line(line: &str) -> Result<ListLine> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    if tokens.len() < 6 {
        return Ok(ListLine::End);
    }

    let mut flight = None;
    let mut start = None;
    let mut end = None;
    if tokens[0] == "flight" {
        flight = Some(
            tokens[1]
                .parse::<u16>()
                .map_err(|e| AltosError::Parse(format!("bad flight {:?}: {}", tokens[1], e)))?,
        );
    }
    if tokens[2] == "start" {
        start = Some(parse_hex_u32(tokens[3])?);
    }
    if tokens[4] == "end" {
        end = Some(parse_hex_u32(tokens[5])?);
    }

    match (flight, start, end) {
        (Some(flight), Some(start), Some(end)) if flight != 0 && end > start => {
            Ok(ListLine::Flight(EepromFlight { flight, start, end }))
        }
        _ => Ok(ListLine::Dropped),
    }
}

impl EepromList {
    /// Read the device configuration and flight listing
    ///
    /// With `remote` set the session is relayed over the radio; it is always
    /// closed again, whether or not the listing succeeded.
    ///
    /// # Errors
    ///
    /// Returns `Timeout` if the device stops answering before `done`
    pub async fn fetch<L: Link + ?Sized>(link: &mut L, remote: bool, timeout_ms: u64) -> Result<Self> {
        if remote {
            link.start_remote().await?;
        }

        let result = Self::fetch_inner(link, timeout_ms).await;

        let flushed = link.flush_output().await;
        if remote {
            if let Err(e) = link.stop_remote().await {
                warn!("Failed to stop remote session: {}", e);
            }
        }

        let list = result?;
        flushed?;
        info!("Device lists {} flight(s)", list.flights.len());
        Ok(list)
    }

    async fn fetch_inner<L: Link + ?Sized>(link: &mut L, timeout_ms: u64) -> Result<Self> {
        let config = ConfigData::fetch(link, timeout_ms).await?;

        link.printf("l\n").await?;
        link.flush_output().await?;

        let mut flights = Vec::new();
        loop {
            let line = link
                .get_reply_no_dialog(timeout_ms)
                .await?
                .ok_or_else(|| AltosError::Timeout("flight list".to_string()))?;

            if line.contains("done") {
                break;
            }
            if line.contains("Syntax") {
                continue;
            }

            match parse_list_line(&line) {
                Ok(ListLine::Flight(flight)) => {
                    debug!("Listed flight {} blocks {:x}..{:x}", flight.flight, flight.start, flight.end);
                    flights.push(flight);
                }
                Ok(ListLine::Dropped) => debug!("Dropping listing line: {}", line),
                Ok(ListLine::End) => break,
                Err(e) => warn!("Parse error in listing line {:?}: {}", line, e),
            }
        }

        Ok(Self { config, flights })
    }
}

/// Parse one dump line `ADDR b0 .. b15`
fn parse_dump_line(line: &str) -> Option<(usize, [u8; DUMP_BYTES_PER_LINE])> {
    let mut tokens = line.split_whitespace();
    let address = usize::from_str_radix(tokens.next()?, 16).ok()?;

    let mut data = [0u8; DUMP_BYTES_PER_LINE];
    for byte in data.iter_mut() {
        *byte = u8::from_str_radix(tokens.next()?, 16).ok()?;
    }
    if tokens.next().is_some() {
        return None;
    }
    Some((address, data))
}

/// Read one block
///
/// Each of the block's dump lines must arrive exactly once.
async fn read_block<L: Link + ?Sized>(link: &mut L, block: u32, timeout_ms: u64) -> Result<Vec<u8>> {
    link.printf(&format!("e {:x}\n", block)).await?;
    link.flush_output().await?;

    const LINES: usize = EEPROM_BLOCK_SIZE / DUMP_BYTES_PER_LINE;
    let base = block as usize * EEPROM_BLOCK_SIZE;
    let mut data = vec![0u8; EEPROM_BLOCK_SIZE];
    let mut received = [false; LINES];
    let mut filled = 0;

    while filled < LINES {
        let line = link
            .get_reply_no_dialog(timeout_ms)
            .await?
            .ok_or_else(|| AltosError::Timeout(format!("eeprom block {:x}", block)))?;

        let Some((address, bytes)) = parse_dump_line(&line) else {
            debug!("Skipping dump line: {}", line);
            continue;
        };

        let offset = address.wrapping_sub(base);
        if address < base || offset >= EEPROM_BLOCK_SIZE || offset % DUMP_BYTES_PER_LINE != 0 {
            return Err(AltosError::Parse(format!(
                "dump address {:x} not a line of block {:x}",
                address, block
            )));
        }

        let index = offset / DUMP_BYTES_PER_LINE;
        if received[index] {
            return Err(AltosError::Parse(format!(
                "dump address {:x} repeated in block {:x}",
                address, block
            )));
        }
        received[index] = true;
        data[offset..offset + DUMP_BYTES_PER_LINE].copy_from_slice(&bytes);
        filled += 1;
    }

    Ok(data)
}

/// Download every block of one flight
pub async fn download_flight<L: Link + ?Sized>(
    link: &mut L,
    flight: &EepromFlight,
    timeout_ms: u64,
) -> Result<Vec<u8>> {
    let mut data = Vec::with_capacity(flight.blocks().len() * EEPROM_BLOCK_SIZE);
    for block in flight.blocks() {
        data.extend(read_block(link, block, timeout_ms).await?);
    }
    debug!("Downloaded flight {}: {} bytes", flight.flight, data.len());
    Ok(data)
}

/// Download each listed flight; a failed flight does not stop the rest
pub async fn download_all<L: Link + ?Sized>(
    link: &mut L,
    list: &EepromList,
    timeout_ms: u64,
) -> Vec<(EepromFlight, Result<Vec<u8>>)> {
    let mut results = Vec::with_capacity(list.flights.len());
    for flight in &list.flights {
        let result = download_flight(link, flight, timeout_ms).await;
        if let Err(e) = &result {
            warn!("Flight {} download failed: {}", flight.flight, e);
        }
        results.push((*flight, result));
    }
    results
}

/// Download every listed flight, inside a remote session when `remote` is set
///
/// The session is always closed; failing to close it is logged and the
/// downloaded flights are still returned.
///
/// # Errors
///
/// Returns error only if the remote session cannot be started
pub async fn download_session<L: Link + ?Sized>(
    link: &mut L,
    list: &EepromList,
    remote: bool,
    timeout_ms: u64,
) -> Result<Vec<(EepromFlight, Result<Vec<u8>>)>> {
    if remote {
        link.start_remote().await?;
    }

    let results = download_all(link, list, timeout_ms).await;

    if remote {
        if let Err(e) = link.stop_remote().await {
            warn!("Failed to stop remote session: {}", e);
        }
    }
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::MockLink;
    use std::collections::VecDeque;

    const CONFIG_REPLY: &[&str] = &["serial-number 2345", "log-format 2", "software-version 1.9.18"];

    /// Link replaying `replies` in order, then timing out
    fn scripted_link(replies: Vec<&str>) -> MockLink {
        let mut queue: VecDeque<String> = CONFIG_REPLY
            .iter()
            .chain(replies.iter())
            .map(|l| l.to_string())
            .collect();

        let mut link = MockLink::new();
        link.expect_printf().returning(|_| Ok(()));
        link.expect_flush_output().returning(|| Ok(()));
        link.expect_get_reply_no_dialog()
            .returning(move |_| Ok(queue.pop_front()));
        link
    }

    #[test]
    fn test_parse_list_line() {
        assert_eq!(
            parse_list_line("flight 3 start 0010 end 001c").unwrap(),
            ListLine::Flight(EepromFlight {
                flight: 3,
                start: 0x10,
                end: 0x1c
            })
        );
        assert_eq!(parse_list_line("flight 0 start 10 end 20").unwrap(), ListLine::Dropped);
        assert_eq!(parse_list_line("flight 2 start 20 end 20").unwrap(), ListLine::Dropped);
        assert_eq!(parse_list_line("flight 2 start 20").unwrap(), ListLine::End);
        assert!(parse_list_line("flight x start 10 end 20").is_err());
        assert!(parse_list_line("flight 2 start 1g end 20").is_err());
    }

    #[tokio::test]
    async fn test_fetch_listing() {
        let mut link = scripted_link(vec![
            "flight 1 start 0 end 4",
            "Syntax error",
            "flight x start 4 end 8",
            "flight 0 start 8 end c",
            "flight 2 start c end 10",
            "done",
        ]);

        let list = EepromList::fetch(&mut link, false, 1000).await.unwrap();
        assert_eq!(list.config.serial, Some(2345));
        assert_eq!(
            list.flights,
            vec![
                EepromFlight {
                    flight: 1,
                    start: 0,
                    end: 4
                },
                EepromFlight {
                    flight: 2,
                    start: 0xc,
                    end: 0x10
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_fetch_stops_at_short_line() {
        let mut link = scripted_link(vec!["flight 1 start 0 end 4", "", "flight 2 start 4 end 8"]);
        let list = EepromList::fetch(&mut link, false, 1000).await.unwrap();
        assert_eq!(list.flights.len(), 1);
    }

    #[tokio::test]
    async fn test_fetch_timeout_still_stops_remote() {
        let mut link = scripted_link(vec!["flight 1 start 0 end 4"]);
        link.expect_start_remote().times(1).returning(|| Ok(()));
        link.expect_stop_remote().times(1).returning(|| Ok(()));

        let result = EepromList::fetch(&mut link, true, 1000).await;
        assert!(matches!(result, Err(AltosError::Timeout(_))));
    }

    #[tokio::test]
    async fn test_fetch_local_never_touches_remote() {
        let mut link = scripted_link(vec!["done"]);
        link.expect_start_remote().never();
        link.expect_stop_remote().never();

        let list = EepromList::fetch(&mut link, false, 1000).await.unwrap();
        assert!(list.flights.is_empty());
    }

    fn dump_lines(block: u32, fill: u8) -> Vec<String> {
        (0..EEPROM_BLOCK_SIZE / DUMP_BYTES_PER_LINE)
            .map(|line| {
                let address = block as usize * EEPROM_BLOCK_SIZE + line * DUMP_BYTES_PER_LINE;
                let bytes: Vec<String> = (0..DUMP_BYTES_PER_LINE).map(|_| format!("{:02x}", fill)).collect();
                format!("{:06x} {}", address, bytes.join(" "))
            })
            .collect()
    }

    #[test]
    fn test_parse_dump_line() {
        let (address, data) = parse_dump_line("000100 00 01 02 03 04 05 06 07 08 09 0a 0b 0c 0d 0e 0f").unwrap();
        assert_eq!(address, 0x100);
        assert_eq!(data[15], 0x0f);
        assert!(parse_dump_line("000100 00 01").is_none());
        assert!(parse_dump_line("e 1").is_none());
    }

    #[tokio::test]
    async fn test_download_flight() {
        let mut queue: VecDeque<String> = VecDeque::new();
        queue.push_back("e 2".to_string());
        queue.extend(dump_lines(2, 0xaa));
        queue.extend(dump_lines(3, 0x55));

        let mut link = MockLink::new();
        link.expect_printf()
            .withf(|text| text.starts_with("e "))
            .times(2)
            .returning(|_| Ok(()));
        link.expect_flush_output().returning(|| Ok(()));
        link.expect_get_reply_no_dialog()
            .returning(move |_| Ok(queue.pop_front()));

        let flight = EepromFlight {
            flight: 5,
            start: 2,
            end: 4,
        };
        let data = download_flight(&mut link, &flight, 1000).await.unwrap();
        assert_eq!(data.len(), 2 * EEPROM_BLOCK_SIZE);
        assert!(data[..EEPROM_BLOCK_SIZE].iter().all(|&b| b == 0xaa));
        assert!(data[EEPROM_BLOCK_SIZE..].iter().all(|&b| b == 0x55));
    }

    #[tokio::test]
    async fn test_download_all_survives_timeout() {
        // First flight times out partway; second flight's block arrives later
        let mut script: VecDeque<Option<String>> = VecDeque::new();
        script.extend(dump_lines(0, 1).into_iter().take(3).map(Some));
        script.push_back(None);
        script.extend(dump_lines(1, 2).into_iter().map(Some));

        let mut link = MockLink::new();
        link.expect_printf().returning(|_| Ok(()));
        link.expect_flush_output().returning(|| Ok(()));
        link.expect_get_reply_no_dialog()
            .returning(move |_| Ok(script.pop_front().flatten()));

        let list = EepromList {
            config: ConfigData::default(),
            flights: vec![
                EepromFlight {
                    flight: 1,
                    start: 0,
                    end: 1,
                },
                EepromFlight {
                    flight: 2,
                    start: 1,
                    end: 2,
                },
            ],
        };

        let results = download_all(&mut link, &list, 1000).await;
        assert_eq!(results.len(), 2);
        assert!(matches!(results[0].1, Err(AltosError::Timeout(_))));
        assert_eq!(results[1].0.flight, 2);
        assert!(results[1].1.as_ref().unwrap().iter().all(|&b| b == 2));
    }

    fn dump_link(lines: Vec<String>) -> MockLink {
        let mut queue: VecDeque<String> = lines.into();
        let mut link = MockLink::new();
        link.expect_printf().returning(|_| Ok(()));
        link.expect_flush_output().returning(|| Ok(()));
        link.expect_get_reply_no_dialog()
            .returning(move |_| Ok(queue.pop_front()));
        link
    }

    #[tokio::test]
    async fn test_download_rejects_repeated_line() {
        let mut lines = dump_lines(0, 0x11);
        lines[15] = lines[0].clone();
        let mut link = dump_link(lines);

        let flight = EepromFlight {
            flight: 1,
            start: 0,
            end: 1,
        };
        let result = download_flight(&mut link, &flight, 1000).await;
        assert!(matches!(result, Err(AltosError::Parse(_))));
    }

    #[tokio::test]
    async fn test_download_rejects_line_from_other_block() {
        let mut lines = dump_lines(3, 0x22);
        lines[7] = dump_lines(4, 0x22)[7].clone();
        let mut link = dump_link(lines);

        let flight = EepromFlight {
            flight: 1,
            start: 3,
            end: 4,
        };
        let result = download_flight(&mut link, &flight, 1000).await;
        assert!(matches!(result, Err(AltosError::Parse(_))));
    }

    #[tokio::test]
    async fn test_download_accepts_lines_out_of_order() {
        let mut lines = dump_lines(1, 0x33);
        lines.reverse();
        let mut link = dump_link(lines);

        let flight = EepromFlight {
            flight: 1,
            start: 1,
            end: 2,
        };
        let data = download_flight(&mut link, &flight, 1000).await.unwrap();
        assert!(data.iter().all(|&b| b == 0x33));
    }

    #[tokio::test]
    async fn test_download_session_keeps_flights_when_stop_fails() {
        let mut link = dump_link(dump_lines(0, 0x44));
        link.expect_start_remote().times(1).returning(|| Ok(()));
        link.expect_stop_remote()
            .times(1)
            .returning(|| Err(AltosError::Serial("gone".to_string())));

        let list = EepromList {
            config: ConfigData::default(),
            flights: vec![EepromFlight {
                flight: 1,
                start: 0,
                end: 1,
            }],
        };

        let results = download_session(&mut link, &list, true, 1000).await.unwrap();
        assert_eq!(results.len(), 1);
        assert!(results[0].1.as_ref().unwrap().iter().all(|&b| b == 0x44));
    }

    #[tokio::test]
    async fn test_download_session_start_failure() {
        let mut link = dump_link(Vec::new());
        link.expect_start_remote()
            .returning(|| Err(AltosError::Serial("gone".to_string())));
        link.expect_stop_remote().never();

        let result = download_session(&mut link, &EepromList::default(), true, 1000).await;
        assert!(matches!(result, Err(AltosError::Serial(_))));
    }
}
