//! M3U8 playlist containers and their line-oriented parsers.
//!
//! Both parsers consume one line at a time and keep a small state machine:
//! `Init` until `#EXTM3U` is seen, then `InputLine` for tags, with a hop to
//! `PlaylistLine` when the next line carries a URI (`#EXTINF` without an
//! inline URI, `#EXT-X-STREAM-INF`). Blank lines and unrecognized tags are
//! ignored; recognized tags with unparseable values are errors.

use crate::error::PlaylistError;

/// One media segment reference.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Segment {
    pub uri: String,
    /// Duration in seconds, from `#EXTINF`.
    pub duration: f32,
}

/// A media playlist: an ordered run of segments plus its header tags.
#[derive(Debug, Clone)]
pub struct MediaPlaylist {
    pub uri: String,
    /// First media sequence number, from `#EXT-X-MEDIA-SEQUENCE`.
    pub seq_no: u64,
    /// Upper bound on segment duration in seconds.
    pub target_duration: f32,
    pub version: u32,
    segments: Vec<Segment>,
}

impl MediaPlaylist {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            seq_no: 0,
            target_duration: 0.0,
            version: 1,
            segments: Vec::new(),
        }
    }

    pub fn add_segment(&mut self, segment: Segment) {
        self.segments.push(segment);
    }

    pub fn segment(&self, index: usize) -> Option<&Segment> {
        self.segments.get(index)
    }

    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    pub fn segments(&self) -> impl Iterator<Item = &Segment> {
        self.segments.iter()
    }
}

/// Rendition attributes from `#EXT-X-STREAM-INF`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlaylistInfo {
    pub frame_width: u32,
    pub frame_height: u32,
    /// Peak bandwidth in bits per second.
    pub bandwidth: u32,
    /// Codec identifiers; retained opaque (RFC 6381 strings are not
    /// decoded).
    pub codecs: [u32; 4],
    /// Set once the rendition's media playlist has been fetched and
    /// parsed; cleared when a fetch fails.
    pub available: bool,
}

/// One rendition: its stream attributes and its media playlist.
#[derive(Debug, Clone)]
pub struct Rendition {
    pub info: PlaylistInfo,
    pub playlist: MediaPlaylist,
}

/// A master playlist: the ordered rendition list.
#[derive(Debug, Clone, Default)]
pub struct MasterPlaylist {
    renditions: Vec<Rendition>,
}

impl MasterPlaylist {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_rendition(&mut self, info: PlaylistInfo, uri: impl Into<String>) {
        self.renditions.push(Rendition {
            info,
            playlist: MediaPlaylist::new(uri),
        });
    }

    pub fn len(&self) -> usize {
        self.renditions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.renditions.is_empty()
    }

    pub fn rendition(&self, index: usize) -> Option<&Rendition> {
        self.renditions.get(index)
    }

    pub fn rendition_mut(&mut self, index: usize) -> Option<&mut Rendition> {
        self.renditions.get_mut(index)
    }

    pub fn renditions(&self) -> impl Iterator<Item = &Rendition> {
        self.renditions.iter()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParserState {
    Init,
    InputLine,
    PlaylistLine,
}

/// Line parser for media playlists.
#[derive(Debug)]
pub struct MediaPlaylistParser {
    state: ParserState,
    pending: Segment,
}

impl Default for MediaPlaylistParser {
    fn default() -> Self {
        Self::new()
    }
}

impl MediaPlaylistParser {
    pub fn new() -> Self {
        Self {
            state: ParserState::Init,
            pending: Segment::default(),
        }
    }

    pub fn feed_line(
        &mut self,
        playlist: &mut MediaPlaylist,
        line: &str,
    ) -> Result<(), PlaylistError> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Ok(());
        }

        match self.state {
            ParserState::Init => {
                if trimmed == "#EXTM3U" {
                    self.state = ParserState::InputLine;
                }
            }
            ParserState::InputLine => {
                if !trimmed.starts_with('#') {
                    return Ok(());
                }
                let Some((tag, value)) = trimmed.split_once(':') else {
                    return Ok(()); // comment line
                };
                match tag {
                    "#EXT-X-VERSION" => {
                        // First assignment wins; repeated version tags are
                        // ignored.
                        if playlist.version == 1 {
                            playlist.version = value.parse().map_err(|_| {
                                PlaylistError::invalid_value("#EXT-X-VERSION", value)
                            })?;
                        }
                    }
                    "#EXT-X-TARGETDURATION" => {
                        playlist.target_duration = value.parse().map_err(|_| {
                            PlaylistError::invalid_value("#EXT-X-TARGETDURATION", value)
                        })?;
                    }
                    "#EXT-X-MEDIA-SEQUENCE" => {
                        playlist.seq_no = value.parse().map_err(|_| {
                            PlaylistError::invalid_value("#EXT-X-MEDIA-SEQUENCE", value)
                        })?;
                    }
                    "#EXTINF" => {
                        let Some((duration, rest)) = value.split_once(',') else {
                            return Err(PlaylistError::MalformedExtInf(trimmed.to_string()));
                        };
                        self.pending.duration = duration
                            .parse()
                            .map_err(|_| PlaylistError::invalid_value("#EXTINF", duration))?;
                        if rest.is_empty() {
                            self.state = ParserState::PlaylistLine;
                        } else {
                            // URI on the same line: emit immediately.
                            self.pending.uri = rest.to_string();
                            playlist.add_segment(std::mem::take(&mut self.pending));
                        }
                    }
                    _ => {} // unrecognized tag
                }
            }
            ParserState::PlaylistLine => {
                self.pending.uri = trimmed.to_string();
                playlist.add_segment(std::mem::take(&mut self.pending));
                self.state = ParserState::InputLine;
            }
        }
        Ok(())
    }
}

/// Line parser for master playlists.
#[derive(Debug)]
pub struct MasterPlaylistParser {
    state: ParserState,
    pending: PlaylistInfo,
    version: u32,
}

impl Default for MasterPlaylistParser {
    fn default() -> Self {
        Self::new()
    }
}

impl MasterPlaylistParser {
    pub fn new() -> Self {
        Self {
            state: ParserState::Init,
            pending: PlaylistInfo::default(),
            version: 1,
        }
    }

    pub fn feed_line(
        &mut self,
        playlist: &mut MasterPlaylist,
        line: &str,
    ) -> Result<(), PlaylistError> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Ok(());
        }

        match self.state {
            ParserState::Init => {
                if trimmed == "#EXTM3U" {
                    self.state = ParserState::InputLine;
                }
            }
            ParserState::InputLine => {
                if !trimmed.starts_with('#') {
                    return Ok(());
                }
                let Some((tag, value)) = trimmed.split_once(':') else {
                    return Ok(());
                };
                match tag {
                    "#EXT-X-VERSION" => {
                        if self.version == 1 {
                            self.version = value.parse().map_err(|_| {
                                PlaylistError::invalid_value("#EXT-X-VERSION", value)
                            })?;
                        }
                    }
                    "#EXT-X-STREAM-INF" => {
                        self.parse_stream_inf(value)?;
                        // The next line carries the rendition URI.
                        self.state = ParserState::PlaylistLine;
                    }
                    _ => {}
                }
            }
            ParserState::PlaylistLine => {
                playlist.add_rendition(std::mem::take(&mut self.pending), trimmed);
                self.state = ParserState::InputLine;
            }
        }
        Ok(())
    }

    fn parse_stream_inf(&mut self, value: &str) -> Result<(), PlaylistError> {
        for (key, attr) in split_attributes(value) {
            match key {
                "BANDWIDTH" => {
                    self.pending.bandwidth = attr
                        .parse()
                        .map_err(|_| PlaylistError::invalid_value("BANDWIDTH", attr))?;
                }
                "RESOLUTION" => {
                    let Some((w, h)) = attr.split_once('x') else {
                        return Err(PlaylistError::invalid_value("RESOLUTION", attr));
                    };
                    self.pending.frame_width = w
                        .parse()
                        .map_err(|_| PlaylistError::invalid_value("RESOLUTION", attr))?;
                    self.pending.frame_height = h
                        .parse()
                        .map_err(|_| PlaylistError::invalid_value("RESOLUTION", attr))?;
                }
                "CODECS" => {
                    // Retained opaque; see PlaylistInfo::codecs.
                }
                _ => {}
            }
        }
        Ok(())
    }
}

/// Split a `KEY=VALUE,KEY="quoted,value",...` attribute list, honoring
/// quoted strings and stripping their quotes.
fn split_attributes(value: &str) -> impl Iterator<Item = (&str, &str)> {
    let mut parts = Vec::new();
    let mut in_quotes = false;
    let mut start = 0usize;
    for (idx, ch) in value.char_indices() {
        match ch {
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                parts.push(value[start..idx].trim());
                start = idx + 1;
            }
            _ => {}
        }
    }
    if start < value.len() {
        parts.push(value[start..].trim());
    }

    parts.into_iter().filter_map(|part| {
        let (key, mut val) = part.split_once('=')?;
        if let Some(stripped) = val.strip_prefix('"').and_then(|s| s.strip_suffix('"')) {
            val = stripped;
        }
        Some((key.trim(), val))
    })
}
