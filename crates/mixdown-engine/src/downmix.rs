//! Custom routing of input tracks to output channels.

use serde::{Deserialize, Serialize};

/// Boolean track × channel routing grid.
///
/// Storage always spans `max_num_channels` columns so the active channel
/// count can change without reallocating. Cells outside the active
/// `num_tracks × num_channels` area are kept cleared.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Downmix {
    num_tracks: usize,
    num_channels: usize,
    max_num_channels: usize,
    map: Vec<Vec<bool>>,
}

impl Downmix {
    /// Create a matrix routing track `i` to channel `i`.
    ///
    /// The channel count starts at `num_tracks`, capped at
    /// `max_num_channels`.
    pub fn new(num_tracks: usize, max_num_channels: usize) -> Self {
        let num_channels = num_tracks.min(max_num_channels);
        let map = (0..num_tracks)
            .map(|i| (0..max_num_channels).map(|j| j < num_channels && i == j).collect())
            .collect();
        Self {
            num_tracks,
            num_channels,
            max_num_channels,
            map,
        }
    }

    pub fn num_tracks(&self) -> usize {
        self.num_tracks
    }

    pub fn num_channels(&self) -> usize {
        self.num_channels
    }

    pub fn max_num_channels(&self) -> usize {
        self.max_num_channels
    }

    /// Change the active channel count.
    ///
    /// Columns leaving or entering the active range are cleared. Returns
    /// `false` (and changes nothing) above `max_num_channels`.
    pub fn set_num_channels(&mut self, num_channels: usize) -> bool {
        if num_channels == self.num_channels {
            return true;
        }
        if num_channels > self.max_num_channels {
            return false;
        }
        let lo = num_channels.min(self.num_channels);
        let hi = num_channels.max(self.num_channels);
        for row in &mut self.map {
            row[lo..hi].fill(false);
        }
        self.num_channels = num_channels;
        true
    }

    /// Whether `track` feeds `channel`; `false` outside the active area.
    pub fn get(&self, track: usize, channel: usize) -> bool {
        channel < self.num_channels
            && self
                .map
                .get(track)
                .and_then(|row| row.get(channel))
                .copied()
                .unwrap_or(false)
    }

    /// Route `track` to `channel` or not. Returns `false` when the cell is
    /// outside the active area.
    pub fn set(&mut self, track: usize, channel: usize, on: bool) -> bool {
        if track >= self.num_tracks || channel >= self.num_channels {
            return false;
        }
        self.map[track][channel] = on;
        true
    }

    /// Active channel flags of `track`.
    pub fn row(&self, track: usize) -> Option<&[bool]> {
        self.map.get(track).map(|row| &row[..self.num_channels])
    }

    /// Whether the matrix fits a session of this shape.
    pub fn matches(&self, num_tracks: usize, num_channels: usize) -> bool {
        self.num_tracks == num_tracks && self.num_channels == num_channels
    }
}
