//! Kitty graphics protocol command parser.
//!
//! A command is the text between `ESC _ G` and `ESC \`:
//!
//! ```text
//! <key>=<value>,<key>=<value>,...;<payload>
//! ```
//!
//! The control keys are collected into a map (first occurrence of a key wins),
//! then the `a` key selects which parameter structs get built from that map.
//! Every field has a default when its key is absent. Numeric keys that fail to
//! parse fall back to their default; enumerated keys with an unknown value
//! reject the whole command.
//!
//! Reference: <https://sw.kovidgoyal.net/kitty/graphics-protocol/>

use std::collections::HashMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ParseError;

/// Control keys of one command, as raw strings.
#[derive(Debug, Default)]
struct Controls<'a> {
    values: HashMap<&'a str, &'a str>,
}

impl<'a> Controls<'a> {
    fn parse(segment: &'a str) -> Self {
        let mut values = HashMap::new();
        for pair in segment.split(',') {
            let Some((key, value)) = pair.split_once('=') else {
                if !pair.is_empty() {
                    log::trace!("ignoring control without '=': {pair:?}");
                }
                continue;
            };
            values.entry(key).or_insert(value);
        }
        Self { values }
    }

    fn get(&self, key: &str) -> Option<&'a str> {
        self.values.get(key).copied()
    }

    fn number<T: FromStr>(&self, key: &str) -> Option<T> {
        self.get(key).and_then(|v| v.parse().ok())
    }

    fn u32(&self, key: &str) -> u32 {
        self.number(key).unwrap_or(0)
    }

    fn i32(&self, key: &str) -> i32 {
        self.number(key).unwrap_or(0)
    }

    fn u64(&self, key: &str) -> u64 {
        self.number(key).unwrap_or(0)
    }

    /// Look up an enumerated key, using `default` when it is absent.
    fn choice<T>(
        &self,
        key: &'static str,
        default: T,
        from_value: fn(&str) -> Option<T>,
    ) -> Result<T, ParseError> {
        match self.get(key) {
            None => Ok(default),
            Some(value) => from_value(value).ok_or_else(|| ParseError::InvalidValue {
                key,
                value: value.to_string(),
            }),
        }
    }
}

/// The `a` key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Action {
    /// `f`: transmit data for animation frames.
    AnimationFrame,
    /// `q`: query the terminal.
    Query,
    /// `t`: transmit data.
    Transmit,
    /// `T`: transmit data and display the image.
    TransmitAndDisplay,
    /// `p`: put (display) a previously transmitted image.
    Put,
    /// `d`: delete images or placements.
    Delete,
    /// `a`: control animation.
    ControlAnimation,
    /// `c`: compose animation frames.
    Compose,
}

impl Action {
    fn from_value(value: &str) -> Option<Self> {
        Some(match value {
            "f" => Self::AnimationFrame,
            "q" => Self::Query,
            "t" => Self::Transmit,
            "T" => Self::TransmitAndDisplay,
            "p" => Self::Put,
            "d" => Self::Delete,
            "a" => Self::ControlAnimation,
            "c" => Self::Compose,
            _ => return None,
        })
    }
}

/// The `f` key: how the decoded bytes are laid out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Format {
    /// `24`: packed RGB, 3 bytes per pixel.
    Raw24,
    /// `32`: packed RGBA, 4 bytes per pixel.
    Raw32,
    /// `100`: a PNG file.
    Png,
}

impl Format {
    fn from_value(value: &str) -> Option<Self> {
        Some(match value {
            "24" => Self::Raw24,
            "32" => Self::Raw32,
            "100" => Self::Png,
            _ => return None,
        })
    }
}

/// The `t` key: where the image bytes come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Medium {
    /// `d`: inline, inside the escape code itself.
    Direct,
    /// `f`: a regular file path.
    File,
    /// `t`: a temporary file that the terminal deletes after reading.
    TemporaryFile,
    /// `s`: a POSIX shared memory object.
    SharedMemory,
}

impl Medium {
    fn from_value(value: &str) -> Option<Self> {
        Some(match value {
            "d" => Self::Direct,
            "f" => Self::File,
            "t" => Self::TemporaryFile,
            "s" => Self::SharedMemory,
            _ => return None,
        })
    }
}

/// The `o` key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Compression {
    /// `z`: zlib deflate.
    Zlib,
    /// Empty or absent.
    None,
}

impl Compression {
    fn from_value(value: &str) -> Option<Self> {
        match value {
            "z" => Some(Self::Zlib),
            "" => Some(Self::None),
            _ => None,
        }
    }
}

/// The `m` key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum More {
    /// `1`: more chunks follow.
    ExpectMore,
    /// `0`: last (or only) chunk.
    FinalChunk,
}

impl More {
    fn from_value(value: &str) -> Option<Self> {
        match value {
            "1" => Some(Self::ExpectMore),
            "0" => Some(Self::FinalChunk),
            _ => None,
        }
    }
}

/// The `q` key: which replies to suppress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Verbosity {
    /// `0`: reply to everything.
    #[default]
    Normal,
    /// `1`: suppress `OK` replies.
    ErrorsOnly,
    /// `2`: suppress every reply.
    Quiet,
}

impl Verbosity {
    fn from_value(value: &str) -> Option<Self> {
        match value {
            "0" => Some(Self::Normal),
            "1" => Some(Self::ErrorsOnly),
            "2" => Some(Self::Quiet),
            _ => None,
        }
    }

    /// Lenient mapping used by display commands, where `q` is numeric.
    pub fn from_level(level: u32) -> Self {
        match level {
            1 => Self::ErrorsOnly,
            2 => Self::Quiet,
            _ => Self::Normal,
        }
    }
}

/// Control parameters for transmitting image bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageTransmission {
    /// `f`
    pub format: Format,
    /// `t`
    pub medium: Medium,
    /// `s`: width in pixels for raw formats.
    pub width: u32,
    /// `v`: height in pixels for raw formats.
    pub height: u32,
    /// `S`: bytes to read from a file medium.
    pub size: u64,
    /// `O`: offset into a file medium.
    pub offset: u64,
    /// `i`: client-assigned image id, 0 when unset.
    pub identifier: u32,
    /// `I`: client-assigned image number; the terminal picks the id.
    pub image_number: u32,
    /// `p`
    pub placement: u32,
    /// `o`
    pub compression: Compression,
    /// `m`
    pub more: More,
    /// `q`
    pub verbosity: Verbosity,
    /// Cleared once an id has been allocated for `image_number`.
    pub(crate) allocation_allowed: bool,
}

impl Default for ImageTransmission {
    fn default() -> Self {
        Self {
            format: Format::Raw32,
            medium: Medium::Direct,
            width: 0,
            height: 0,
            size: 0,
            offset: 0,
            identifier: 0,
            image_number: 0,
            placement: 0,
            compression: Compression::None,
            more: More::FinalChunk,
            verbosity: Verbosity::Normal,
            allocation_allowed: true,
        }
    }
}

impl ImageTransmission {
    fn from_controls(controls: &Controls<'_>) -> Result<Self, ParseError> {
        Ok(Self {
            format: controls.choice("f", Format::Raw32, Format::from_value)?,
            medium: controls.choice("t", Medium::Direct, Medium::from_value)?,
            width: controls.u32("s"),
            height: controls.u32("v"),
            size: controls.u64("S"),
            offset: controls.u64("O"),
            identifier: controls.u32("i"),
            image_number: controls.u32("I"),
            placement: controls.u32("p"),
            compression: controls.choice("o", Compression::None, Compression::from_value)?,
            more: controls.choice("m", More::FinalChunk, More::from_value)?,
            verbosity: controls.choice("q", Verbosity::Normal, Verbosity::from_value)?,
            allocation_allowed: true,
        })
    }

    pub fn expects_more(&self) -> bool {
        self.more == More::ExpectMore
    }
}

/// The `C` key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CursorMovement {
    /// `0`: move the cursor past the image.
    #[default]
    AfterImage,
    /// `1`: leave the cursor where it is.
    Stay,
}

impl CursorMovement {
    fn from_value(value: &str) -> Option<Self> {
        match value {
            "0" => Some(Self::AfterImage),
            "1" => Some(Self::Stay),
            _ => None,
        }
    }
}

/// Control parameters for placing an image.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ImageDisplay {
    /// `x`, `y`, `w`, `h`: source rectangle in image pixels (0 = whole).
    pub source_x: u32,
    pub source_y: u32,
    pub source_width: u32,
    pub source_height: u32,
    /// `X`, `Y`: pixel offset inside the first cell.
    pub pixel_offset_x: u32,
    pub pixel_offset_y: u32,
    /// `c`: columns to span (0 = derive).
    pub columns: u32,
    /// `r`: rows to span (0 = derive).
    pub rows: u32,
    /// `C`
    pub cursor_movement: CursorMovement,
    /// `U=1`: virtual placement driven by Unicode placeholders.
    pub unicode_placeholder: bool,
    /// `z`
    pub z_index: i32,
    /// `P`
    pub parent_image: Option<u32>,
    /// `Q`
    pub parent_placement: Option<u32>,
    /// `H`, `V`: displacement from the parent, in cells.
    pub horizontal_offset: i32,
    pub vertical_offset: i32,
    /// `q`, read leniently: anything other than 1 or 2 means normal, where a
    /// transmission rejects the command.
    pub verbosity: Verbosity,
    /// `i`
    pub identifier: u32,
    /// `I`
    pub number: u32,
    /// `p`
    pub placement: u32,
}

impl ImageDisplay {
    fn from_controls(controls: &Controls<'_>) -> Result<Self, ParseError> {
        let unicode_placeholder = controls.choice("U", false, |v| match v {
            "0" => Some(false),
            "1" => Some(true),
            _ => None,
        })?;
        Ok(Self {
            source_x: controls.u32("x"),
            source_y: controls.u32("y"),
            source_width: controls.u32("w"),
            source_height: controls.u32("h"),
            pixel_offset_x: controls.u32("X"),
            pixel_offset_y: controls.u32("Y"),
            columns: controls.u32("c"),
            rows: controls.u32("r"),
            cursor_movement: controls.choice("C", CursorMovement::AfterImage, CursorMovement::from_value)?,
            unicode_placeholder,
            z_index: controls.i32("z"),
            parent_image: controls.number("P"),
            parent_placement: controls.number("Q"),
            horizontal_offset: controls.i32("H"),
            vertical_offset: controls.i32("V"),
            verbosity: Verbosity::from_level(controls.u32("q")),
            identifier: controls.u32("i"),
            number: controls.u32("I"),
            placement: controls.u32("p"),
        })
    }
}

/// The `X` key of an animation frame load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FrameComposition {
    #[default]
    AlphaBlend,
    Replace,
}

/// `a=f`: load data into an animation frame.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AnimationFrameLoading {
    /// Region of the frame to replace.
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    /// `c`: 1-based frame to initialize from.
    pub base_frame: u32,
    /// `r`: 1-based frame to edit.
    pub edit_frame: u32,
    /// `z`: gap in milliseconds; negative skips the frame.
    pub gap: i32,
    pub composition: FrameComposition,
    /// `Y`: background RGBA, e.g. `0xff0000ff` is opaque red.
    pub background: u32,
}

impl AnimationFrameLoading {
    fn from_controls(controls: &Controls<'_>) -> Result<Self, ParseError> {
        Ok(Self {
            x: controls.u32("x"),
            y: controls.u32("y"),
            width: controls.u32("s"),
            height: controls.u32("v"),
            base_frame: controls.u32("c"),
            edit_frame: controls.u32("r"),
            gap: controls.i32("z"),
            composition: controls.choice("X", FrameComposition::AlphaBlend, |v| match v {
                "0" => Some(FrameComposition::AlphaBlend),
                "1" => Some(FrameComposition::Replace),
                _ => None,
            })?,
            background: controls.u32("Y"),
        })
    }
}

/// `a=c`: compose one frame onto another.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AnimationFrameComposition {
    pub source_frame: u32,
    pub destination_frame: u32,
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    pub destination_x: u32,
    pub destination_y: u32,
    pub blending: FrameComposition,
}

impl AnimationFrameComposition {
    fn from_controls(controls: &Controls<'_>) -> Result<Self, ParseError> {
        Ok(Self {
            source_frame: controls.u32("c"),
            destination_frame: controls.u32("r"),
            x: controls.u32("x"),
            y: controls.u32("y"),
            width: controls.u32("w"),
            height: controls.u32("h"),
            destination_x: controls.u32("X"),
            destination_y: controls.u32("Y"),
            blending: controls.choice("C", FrameComposition::AlphaBlend, |v| match v {
                "0" => Some(FrameComposition::AlphaBlend),
                "1" => Some(FrameComposition::Replace),
                _ => None,
            })?,
        })
    }
}

/// The `s` key of an animation control command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AnimationMode {
    #[default]
    Unchanged,
    Stop,
    RunAndWait,
    Run,
}

/// `a=a`: control a running animation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AnimationControl {
    pub mode: AnimationMode,
    pub frame: u32,
    pub gap: i32,
    pub current_frame: u32,
    pub loops: u32,
    pub identifier: u32,
}

impl AnimationControl {
    fn from_controls(controls: &Controls<'_>) -> Result<Self, ParseError> {
        Ok(Self {
            mode: controls.choice("s", AnimationMode::Unchanged, |v| match v {
                "0" => Some(AnimationMode::Unchanged),
                "1" => Some(AnimationMode::Stop),
                "2" => Some(AnimationMode::RunAndWait),
                "3" => Some(AnimationMode::Run),
                _ => None,
            })?,
            frame: controls.u32("r"),
            gap: controls.i32("z"),
            current_frame: controls.u32("c"),
            loops: controls.u32("v"),
            identifier: controls.u32("i"),
        })
    }
}

/// The `d` key of a delete command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteSelector {
    /// Empty value: every image and every placement.
    Everything,
    /// `a`/`A`: every placement; images survive.
    AllPlacements,
    /// `i`/`I`: by image id, optionally narrowed to one placement.
    ImageId,
    /// `n`/`N`: newest image with a client number.
    ImageNumber,
    /// `c`/`C`: placements under the cursor.
    Cursor,
    /// `p`/`P`: placements covering a 1-based cell.
    Cell,
    /// `q`/`Q`: placements covering a cell with a given z-index.
    CellAtZIndex,
    /// `r`/`R`: images whose id lies in `x..=y`.
    IdRange,
    /// `x`/`X`: placements crossing a column.
    Column,
    /// `y`/`Y`: placements crossing a row.
    Row,
    /// `z`/`Z`: placements at a z-index.
    ZIndex,
    /// `f`/`F`: animation frames.
    AnimationFrames,
    /// Anything else; ignored.
    Unrecognized(String),
}

impl DeleteSelector {
    fn from_value(value: &str) -> Self {
        match value {
            "" => Self::Everything,
            "a" | "A" => Self::AllPlacements,
            "i" | "I" => Self::ImageId,
            "n" | "N" => Self::ImageNumber,
            "c" | "C" => Self::Cursor,
            "p" | "P" => Self::Cell,
            "q" | "Q" => Self::CellAtZIndex,
            "r" | "R" => Self::IdRange,
            "x" | "X" => Self::Column,
            "y" | "Y" => Self::Row,
            "z" | "Z" => Self::ZIndex,
            "f" | "F" => Self::AnimationFrames,
            other => Self::Unrecognized(other.to_string()),
        }
    }
}

/// `a=d`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteImage {
    pub selector: DeleteSelector,
    /// `i`
    pub image_id: u32,
    /// `p`
    pub placement_id: u32,
    /// `I`
    pub number: u32,
    pub x: u32,
    pub y: u32,
    pub z: i32,
}

impl DeleteImage {
    fn from_controls(controls: &Controls<'_>) -> Self {
        Self {
            selector: DeleteSelector::from_value(controls.get("d").unwrap_or("a")),
            image_id: controls.u32("i"),
            placement_id: controls.u32("p"),
            number: controls.u32("I"),
            x: controls.u32("x"),
            y: controls.u32("y"),
            z: controls.i32("z"),
        }
    }
}

/// Parameters of a command, by category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandKind {
    Transmission(ImageTransmission),
    Display(ImageDisplay),
    TransmitAndDisplay(ImageTransmission, ImageDisplay),
    AnimationFrameLoading(AnimationFrameLoading),
    AnimationFrameComposition(AnimationFrameComposition),
    AnimationControl(AnimationControl),
    Delete(DeleteImage),
}

/// One parsed graphics command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub action: Action,
    pub kind: CommandKind,
    /// Everything after the first `;`, usually base64.
    pub payload: String,
}

impl Command {
    /// Parse the text between `ESC _ G` and `ESC \`.
    pub fn parse(input: &str) -> Result<Self, ParseError> {
        let (controls, payload) = input.split_once(';').unwrap_or((input, ""));
        let controls = Controls::parse(controls);
        let action = controls.choice("a", Action::Transmit, Action::from_value)?;

        let kind = match action {
            Action::AnimationFrame => {
                CommandKind::AnimationFrameLoading(AnimationFrameLoading::from_controls(&controls)?)
            }
            Action::Query | Action::Transmit => {
                CommandKind::Transmission(ImageTransmission::from_controls(&controls)?)
            }
            Action::TransmitAndDisplay => CommandKind::TransmitAndDisplay(
                ImageTransmission::from_controls(&controls)?,
                ImageDisplay::from_controls(&controls)?,
            ),
            Action::Put => CommandKind::Display(ImageDisplay::from_controls(&controls)?),
            Action::Delete => CommandKind::Delete(DeleteImage::from_controls(&controls)),
            Action::ControlAnimation => {
                CommandKind::AnimationControl(AnimationControl::from_controls(&controls)?)
            }
            Action::Compose => CommandKind::AnimationFrameComposition(
                AnimationFrameComposition::from_controls(&controls)?,
            ),
        };

        Ok(Self {
            action,
            kind,
            payload: payload.to_string(),
        })
    }
}

impl FromStr for Command {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Parse a command from raw APC bytes.
///
/// # Errors
///
/// Returns [`ParseError`] for invalid UTF-8 or an unknown enumerated value.
pub fn parse_kitty_command(input: &[u8]) -> Result<Command, ParseError> {
    Command::parse(std::str::from_utf8(input)?)
}
