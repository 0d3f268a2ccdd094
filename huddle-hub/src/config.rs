//! Hub configuration.

use clap::Parser;
use huddle_protocol::signaling::DEFAULT_PORT;

/// Configuration, read from flags or the environment. Flags win.
#[derive(Clone, Debug, Parser)]
#[command(name = "huddle-hub", version, about = "Signaling hub for huddle calls")]
pub struct Options {
   /// The port to serve the hub under.
   #[arg(short, long, env = "HUDDLE_PORT", default_value_t = DEFAULT_PORT)]
   pub port: u16,

   /// Comma-separated list of origins allowed by CORS. When empty, any
   /// origin is allowed.
   #[arg(long, env = "HUDDLE_CORS_ORIGINS", value_delimiter = ',')]
   pub cors_origins: Vec<String>,

   /// Hard cap on participants in a single room.
   #[arg(long, env = "HUDDLE_MAX_PARTICIPANTS", default_value_t = 50)]
   pub max_participants: usize,

   /// Minutes without semantic traffic before the sweeper deletes a room.
   #[arg(long, env = "HUDDLE_IDLE_ROOM_TIMEOUT", default_value_t = 60)]
   pub idle_room_timeout: u64,

   /// Seconds between keepalive pings to each client.
   #[arg(long, env = "HUDDLE_PING_INTERVAL", default_value_t = 25)]
   pub ping_interval: u64,

   /// Seconds of client silence after which the connection is dropped.
   #[arg(long, env = "HUDDLE_PING_TIMEOUT", default_value_t = 60)]
   pub ping_timeout: u64,

   /// Seconds between idle room sweeps.
   #[arg(long, env = "HUDDLE_SWEEP_INTERVAL", default_value_t = 300)]
   pub sweep_interval: u64,
}

#[cfg(test)]
mod tests {
   use super::*;

   #[test]
   fn defaults_match_the_reference_deployment() {
      let options = Options::parse_from(["huddle-hub"]);
      assert_eq!(options.port, 3001);
      assert!(options.cors_origins.is_empty());
      assert_eq!(options.max_participants, 50);
      assert_eq!(options.idle_room_timeout, 60);
      assert_eq!(options.ping_interval, 25);
      assert_eq!(options.ping_timeout, 60);
      assert_eq!(options.sweep_interval, 300);
   }

   #[test]
   fn cors_origins_split_on_commas() {
      let options = Options::parse_from([
         "huddle-hub",
         "--cors-origins",
         "https://a.example,https://b.example",
      ]);
      assert_eq!(
         options.cors_origins,
         vec!["https://a.example", "https://b.example"]
      );
   }
}
