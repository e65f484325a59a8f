//! Encoder invocation contract
//!
//! Every encoder is started with the same argument layout:
//!
//! ```text
//! <program> [-f <streamKind>] -i pipe:0 -c:v <video> -preset <preset>
//!           -c:a <audio> -ar <rate> -f flv <origin>/live/<streamId>
//! ```

use super::config::EncoderConfig;

/// A fully resolved encoder command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncoderCommand {
    /// Program to execute
    pub program: String,
    /// Arguments, in order
    pub args: Vec<String>,
    /// Publish destination (also the last argument)
    pub destination: String,
}

impl EncoderCommand {
    /// Build the command for a stream
    pub fn build(config: &EncoderConfig, stream_id: &str, stream_kind: Option<&str>) -> Self {
        let destination = destination_url(&config.origin_base, stream_id);

        let mut args = Vec::with_capacity(16);
        if let Some(kind) = stream_kind {
            args.extend(["-f".to_string(), kind.to_string()]);
        }
        args.extend([
            "-i".to_string(),
            "pipe:0".to_string(),
            "-c:v".to_string(),
            config.video_codec.clone(),
            "-preset".to_string(),
            config.preset.clone(),
            "-c:a".to_string(),
            config.audio_codec.clone(),
            "-ar".to_string(),
            config.audio_sample_rate.to_string(),
            "-f".to_string(),
            "flv".to_string(),
            destination.clone(),
        ]);

        Self {
            program: config.program.clone(),
            args,
            destination,
        }
    }
}

/// Publish URL for a stream: `<origin_base>/live/<stream_id>`
pub fn destination_url(origin_base: &str, stream_id: &str) -> String {
    format!("{}/live/{}", origin_base.trim_end_matches('/'), stream_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_contract() {
        let command = EncoderCommand::build(&EncoderConfig::default(), "room1", None);

        assert_eq!(command.program, "ffmpeg");
        assert_eq!(
            command.args,
            [
                "-i",
                "pipe:0",
                "-c:v",
                "libx264",
                "-preset",
                "veryfast",
                "-c:a",
                "aac",
                "-ar",
                "44100",
                "-f",
                "flv",
                "rtmp://localhost/live/room1",
            ]
        );
        assert_eq!(command.destination, "rtmp://localhost/live/room1");
    }

    #[test]
    fn test_stream_kind_prepended() {
        let command = EncoderCommand::build(&EncoderConfig::default(), "room1", Some("webm"));

        assert_eq!(&command.args[..4], ["-f", "webm", "-i", "pipe:0"]);
        assert_eq!(command.args.last().unwrap(), "rtmp://localhost/live/room1");
    }

    #[test]
    fn test_destination_url_trailing_slash() {
        assert_eq!(
            destination_url("rtmp://origin:1935/", "abc"),
            "rtmp://origin:1935/live/abc"
        );
        assert_eq!(
            destination_url("rtmp://origin:1935", "abc"),
            "rtmp://origin:1935/live/abc"
        );
    }
}
