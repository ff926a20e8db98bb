use hexlink_frame::{HEADER_SIZE, MAX_PAYLOAD_SIZE, PACKET_OVERHEAD};

use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    if !args.extended {
        println!("hexlink {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    println!("name: hexlink");
    println!("version: {}", env!("CARGO_PKG_VERSION"));
    println!(
        "target: {}",
        option_env!("HEXLINK_BUILD_TARGET").unwrap_or("unknown")
    );
    println!(
        "profile: {}",
        option_env!("HEXLINK_BUILD_PROFILE").unwrap_or("unknown")
    );
    println!(
        "features: session=true, serial={}, async={}, cli=true",
        cfg!(feature = "serial"),
        cfg!(feature = "async")
    );
    println!(
        "wire: header={HEADER_SIZE}B overhead={PACKET_OVERHEAD}B max_payload={MAX_PAYLOAD_SIZE}B crc=crc32"
    );

    Ok(SUCCESS)
}
