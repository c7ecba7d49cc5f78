use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    if !args.extended {
        println!("stillink {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    println!("name: stillink");
    println!("version: {}", env!("CARGO_PKG_VERSION"));
    println!(
        "target: {}",
        option_env!("STILLINK_BUILD_TARGET").unwrap_or("unknown")
    );
    println!("target_os: {}", std::env::consts::OS);
    println!("target_arch: {}", std::env::consts::ARCH);
    println!(
        "features: session={}, serial={}, async={}, cli=true",
        cfg!(feature = "session"),
        cfg!(feature = "serial"),
        cfg!(feature = "async")
    );
    println!(
        "default_port: {}",
        stillink_transport::TcpTransport::DEFAULT_PORT
    );

    Ok(SUCCESS)
}
