/*
unsparse, to decode Android sparse images: progress module
Copyright (C) 2024-present Guoxin "7Ji" Pu

This program is free software: you can redistribute it and/or modify
it under the terms of the GNU Affero General Public License as
published by the Free Software Foundation, either version 3 of the
License, or (at your option) any later version.

This program is distributed in the hope that it will be useful,
but WITHOUT ANY WARRANTY; without even the implied warranty of
MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
GNU Affero General Public License for more details.

You should have received a copy of the GNU Affero General Public License
along with this program.  If not, see <https://www.gnu.org/licenses/>.
*/

use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

use crate::{decode::Summary, report::{ChunkEvent, Reporter}, sparse::FileHeader, Result};

const TEMPLATE_SPARSE: &str =
    "Decoding sparse image => [{elapsed_precise}] {bar:40.cyan/blue} \
    {bytes:>10}/{total_bytes:10} {msg}";
const TEMPLATE_RAW: &str =
    "Copying raw image => [{elapsed_precise}] {spinner} {bytes:>10} {msg}";

fn progress_style_with_template<S: AsRef<str>>(template: S)
    -> Result<ProgressStyle>
{
    let template = template.as_ref();
    match ProgressStyle::with_template(template) {
        Ok(style) => Ok(style),
        Err(e) => {
            tracing::error!(
                "Failed to create progress bar style from template '{}': {}",
                template, e
            );
            Err(e.into())
        }
    }
}

/// Progress bar on stderr, sized by the advisory total block count
pub(crate) struct ProgressReport {
    bar: ProgressBar,
    style_raw: ProgressStyle,
}

impl ProgressReport {
    pub(crate) fn new() -> Result<Self> {
        Self::with_bar(ProgressBar::new(0))
    }

    fn with_bar(bar: ProgressBar) -> Result<Self> {
        bar.set_style(progress_style_with_template(TEMPLATE_SPARSE)?);
        Ok(Self {
            bar,
            style_raw: progress_style_with_template(TEMPLATE_RAW)?,
        })
    }
}

impl Reporter for ProgressReport {
    fn header(&mut self, header: &FileHeader) {
        self.bar.set_length(header.declared_output_size());
        self.bar.enable_steady_tick(Duration::from_secs(1));
    }

    fn chunk(&mut self, event: &ChunkEvent) {
        self.bar.set_message(format!("chunk #{} ({})",
            event.index, event.header.chunk_type));
    }

    fn raw_fallback(&mut self, _replayed: usize) {
        self.bar.set_style(self.style_raw.clone());
        self.bar.enable_steady_tick(Duration::from_secs(1));
    }

    fn progress(&mut self, bytes: u64) {
        self.bar.inc(bytes)
    }

    fn finish(&mut self, _summary: Option<&Summary>) -> Result<()> {
        self.bar.finish_and_clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::sparse::tests::valid_header;

    use super::*;

    #[test]
    fn templates_are_valid() {
        assert!(progress_style_with_template(TEMPLATE_SPARSE).is_ok());
        assert!(progress_style_with_template(TEMPLATE_RAW).is_ok());
    }

    #[test]
    fn bar_tracks_output_bytes() {
        let mut report = ProgressReport::with_bar(ProgressBar::hidden()).unwrap();
        let mut header = valid_header();
        header.total_blocks = 4;
        report.header(&header);
        assert_eq!(report.bar.length(), Some(4 * 4096));
        report.progress(4096);
        report.progress(4096);
        assert_eq!(report.bar.position(), 8192);
        report.finish(None).unwrap();
    }
}
