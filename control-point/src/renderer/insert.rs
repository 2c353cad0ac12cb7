//! Sequential OpenHome `Insert` execution.
//!
//! OpenHome inserts one track per action and answers with the new id, which
//! the next insert must go after. At most one [`PlayCommand`] runs at a time;
//! commands arriving meanwhile wait in order.

use std::collections::VecDeque;

use crate::command::{PlayCommand, PlayKind};
use crate::content::MusicTrack;

#[derive(Debug)]
struct InsertRun {
    tracks: VecDeque<MusicTrack>,
    after_id: u32,
    /// Playback still has to be started on the first inserted track
    start_playback: bool,
    inserted: usize,
    total: usize,
}

#[derive(Debug, Default)]
pub struct InsertPipeline {
    run: Option<InsertRun>,
    queued: VecDeque<PlayCommand>,
}

impl InsertPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_busy(&self) -> bool {
        self.run.is_some()
    }

    pub fn enqueue(&mut self, command: PlayCommand) {
        self.queued.push_back(command);
    }

    pub fn next_command(&mut self) -> Option<PlayCommand> {
        self.queued.pop_front()
    }

    /// Start inserting `command` after queue entry `after_id`.
    pub fn begin(&mut self, command: PlayCommand, after_id: u32) {
        self.run = Some(InsertRun {
            total: command.tracks.len(),
            tracks: command.tracks.into(),
            after_id,
            start_playback: command.kind == PlayKind::ReplaceAndPlay,
            inserted: 0,
        });
    }

    /// The track to insert next and the id it goes after.
    pub fn next_track(&self) -> Option<(u32, &MusicTrack)> {
        let run = self.run.as_ref()?;
        run.tracks.front().map(|track| (run.after_id, track))
    }

    /// Record a successful insert. Returns `true` exactly once per
    /// replace-and-play run: for its first track, which must be started.
    pub fn inserted(&mut self, new_id: u32) -> bool {
        let Some(run) = self.run.as_mut() else {
            return false;
        };
        run.tracks.pop_front();
        run.after_id = new_id;
        run.inserted += 1;
        std::mem::replace(&mut run.start_playback, false)
    }

    /// Drop the rest of the running command; `(inserted, total)`.
    pub fn abort(&mut self) -> Option<(usize, usize)> {
        self.run.take().map(|run| (run.inserted, run.total))
    }

    /// Close a run whose tracks are all inserted; the number inserted.
    pub fn finish(&mut self) -> Option<usize> {
        if self.run.as_ref().is_some_and(|run| run.tracks.is_empty()) {
            return self.run.take().map(|run| run.inserted);
        }
        None
    }

    pub fn clear(&mut self) {
        self.run = None;
        self.queued.clear();
    }
}
