use std::path::Path;

use anyhow::{anyhow, Result};

use hessian_rs::Decoder;

pub fn dump_value(input: &Path, hex: bool) -> Result<()> {
    let raw = std::fs::read(input)?;
    let raw = if hex { parse_hex(&raw)? } else { raw };
    let mut decoder = Decoder::new(&raw);
    let mut index = 0usize;
    while decoder.remaining() > 0 {
        let value = decoder
            .decode()
            .map_err(|error| anyhow!("value {index}: {error}"))?;
        println!("{index}: {value:#?}");
        index += 1;
    }
    Ok(())
}

fn parse_hex(raw: &[u8]) -> Result<Vec<u8>> {
    let digits: Vec<u8> = raw
        .iter()
        .copied()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();
    if digits.len() % 2 != 0 {
        return Err(anyhow!("odd number of hex digits"));
    }
    digits
        .chunks(2)
        .map(|pair| Ok(hex_digit(pair[0])? << 4 | hex_digit(pair[1])?))
        .collect()
}

fn hex_digit(digit: u8) -> Result<u8> {
    match digit {
        b'0'..=b'9' => Ok(digit - b'0'),
        b'a'..=b'f' => Ok(digit - b'a' + 10),
        b'A'..=b'F' => Ok(digit - b'A' + 10),
        other => Err(anyhow!("invalid hex digit {:?}", other as char)),
    }
}
