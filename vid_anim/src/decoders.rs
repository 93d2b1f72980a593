//! Decoder inventory parsed from `ffmpeg -decoders`, cached for the process lifetime.

use crate::codec::HW_DECODER_SUFFIXES;
use crate::engine::MediaTools;
use std::collections::BTreeSet;
use std::sync::OnceLock;
use tracing::{debug, warn};

pub type DecoderSet = BTreeSet<String>;

static EMPTY_SET: DecoderSet = BTreeSet::new();

/// Width of the capability column, e.g. `V....D`.
const FLAG_WIDTH: usize = 6;

/// Parse a decoder listing into the names of video-capable decoders.
///
/// ```text
///  V..... = Video            <- legend, skipped
///  ------
///  VFS..D h264               H.264 / AVC / MPEG-4 AVC / MPEG-4 part 10
///  A....D aac                AAC (Advanced Audio Coding)   <- audio, skipped
/// ```
pub fn parse_decoder_listing(listing: &str) -> DecoderSet {
    listing
        .lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let flags = fields.next()?;
            let name = fields.next()?;
            let is_flag_column = flags.len() == FLAG_WIDTH
                && flags.chars().all(|c| c == '.' || c.is_ascii_uppercase());
            if is_flag_column && flags.starts_with('V') && name != "=" {
                Some(name.to_lowercase())
            } else {
                None
            }
        })
        .collect()
}

/// Exact software decoder present, e.g. `h264`.
pub fn has_exact(decoders: &DecoderSet, codec: &str) -> bool {
    decoders.contains(codec)
}

/// Exact decoder or one of the accelerated variants (`h264_cuvid`, `h264_qsv`, `h264_vaapi`).
pub fn has_any_variant(decoders: &DecoderSet, codec: &str) -> bool {
    has_exact(decoders, codec)
        || HW_DECODER_SUFFIXES
            .iter()
            .any(|suffix| decoders.contains(&format!("{}_{}", codec, suffix)))
}

/// Owned, populate-once cache of the host's video decoders.
///
/// Only a successful listing is cached; a failed one yields an empty set and
/// the next call tries again.
#[derive(Debug, Default)]
pub struct DecoderInventory {
    cached: OnceLock<DecoderSet>,
}

impl DecoderInventory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_populated(&self) -> bool {
        self.cached.get().is_some()
    }

    pub fn available<T: MediaTools + ?Sized>(&self, tools: &T) -> &DecoderSet {
        if let Some(set) = self.cached.get() {
            return set;
        }
        match tools.list_decoders() {
            Ok(listing) => {
                let set = parse_decoder_listing(&listing);
                debug!(count = set.len(), "Decoder inventory populated");
                self.cached.get_or_init(|| set)
            }
            Err(e) => {
                warn!(error = %e, "Could not list ffmpeg decoders; decoder steering disabled");
                &EMPTY_SET
            }
        }
    }
}


#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;

    fn flag_column(video: bool) -> impl Strategy<Value = String> {
        let first = if video {
            Just('V').boxed()
        } else {
            prop_oneof![Just('A'), Just('S'), Just('.')].boxed()
        };
        let rest = prop_oneof![Just('.'), Just('F'), Just('S'), Just('X'), Just('B'), Just('D')];
        (first, proptest::collection::vec(rest, 5))
            .prop_map(|(c, rest)| std::iter::once(c).chain(rest).collect::<String>())
    }

    fn listing_line() -> impl Strategy<Value = (bool, String, String)> {
        any::<bool>().prop_flat_map(|video| {
            (Just(video), flag_column(video), "[a-z][a-z0-9_]{1,12}")
        })
    }

    proptest! {
        /// Only video-flagged lines contribute, and line order does not matter.
        #[test]
        fn prop_only_video_lines_contribute(lines in proptest::collection::vec(listing_line(), 0..24)) {
            let render = |ls: &[(bool, String, String)]| -> String {
                ls.iter()
                    .map(|(_, flags, name)| format!(" {} {:<20} Some description", flags, name))
                    .collect::<Vec<_>>()
                    .join("\n")
            };
            let expected: DecoderSet = lines
                .iter()
                .filter(|(video, _, _)| *video)
                .map(|(_, _, name)| name.clone())
                .collect();

            let forward = parse_decoder_listing(&render(&lines));
            let mut reversed_lines = lines.clone();
            reversed_lines.reverse();
            let reversed = parse_decoder_listing(&render(&reversed_lines));

            prop_assert_eq!(&forward, &expected);
            prop_assert_eq!(forward, reversed);
        }
    }
}
