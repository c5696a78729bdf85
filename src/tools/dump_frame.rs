use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use anyhow::Result;

use hessian_rs::{DubboHeader, Error, HessianCodec};

pub fn dump_frame(input: &Path) -> Result<()> {
    let file = BufReader::new(File::open(input)?);
    let mut codec = HessianCodec::new(file);
    let mut header = DubboHeader::default();
    loop {
        match codec.read_header(&mut header) {
            Ok(()) => {}
            // no further frame in the file
            Err(Error::HeaderNotEnough) => break,
            Err(other) => return Err(other.into()),
        }
        println!(
            "id:{} type:{:?} serial:{} status:{:?} body:{}B",
            header.id,
            header.package_type,
            header.serial_id,
            header.status(),
            header.body_len,
        );
        let message = codec.read_body()?;
        println!("{message:#?}");
    }
    Ok(())
}
