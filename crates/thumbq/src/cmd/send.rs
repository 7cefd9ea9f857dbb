use std::fs;

use thumbq_frame::{encode_header, PartConfig, RequestHeader};
use thumbq_service::Client;

use crate::cmd::{parse_duration, SendArgs};
use crate::exit::{header_error, io_error, service_error, CliResult, NOT_HANDLED, SUCCESS};
use crate::output::{print_reply, OutputFormat};

pub fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    let timeout = parse_duration(&args.timeout)?;
    let payload = resolve_payload(&args)?;

    let header = RequestHeader::new(args.declared_length.unwrap_or(payload.len() as u64))
        .with_scale(args.scale)
        .with_crop(args.crop.into());
    let control = encode_header(&header).map_err(|err| header_error("encode failed", err))?;

    let config = PartConfig {
        read_timeout: Some(timeout),
        write_timeout: Some(timeout),
        ..PartConfig::default()
    };
    let mut client = Client::connect_with_config(&args.address, config)
        .map_err(|err| service_error("connect failed", err))?;

    let reply = if args.header_only {
        client.send_raw(&[&control])
    } else {
        client.send_raw(&[&control, &payload])
    }
    .map_err(|err| service_error("request failed", err))?;

    if let (Some(path), Some(result)) = (&args.output, &reply.result) {
        fs::write(path, result)
            .map_err(|err| io_error(&format!("failed writing {}", path.display()), err))?;
    }
    print_reply(&reply, format);

    Ok(if reply.is_handled() {
        SUCCESS
    } else {
        NOT_HANDLED
    })
}

fn resolve_payload(args: &SendArgs) -> CliResult<Vec<u8>> {
    if let Some(data) = &args.data {
        return Ok(data.as_bytes().to_vec());
    }
    if let Some(path) = &args.file {
        return fs::read(path)
            .map_err(|err| io_error(&format!("failed reading {}", path.display()), err));
    }
    Ok(Vec::new())
}
