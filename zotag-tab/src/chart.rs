//! SVG bar charts and the on-disk rendered-image cache
//!
//! Rows of a `LabeledTable` are the categories on the bar axis; columns are
//! the series, one colour each, listed in a legend below the plot.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info};
use zotag_common::Result;

use crate::params::{ChartOptions, GraphFormat, ImageType};
use crate::table::{wrap_label, LabeledTable};

const DEFAULT_SIZE: (f64, f64) = (800.0, 500.0);
const SQUARE_SIZE: (f64, f64) = (400.0, 400.0);

/// Fraction of a category band covered by its bars
const BAR_WIDTH: f64 = 0.85;
const STACKED_BAR_WIDTH: f64 = 0.6;

const FONT_SIZE: f64 = 11.0;
const LINE_HEIGHT: f64 = 13.0;
const LEGEND_COLUMNS: usize = 2;
const TICK_COUNT: usize = 5;

/// Distinguishes temp files of concurrent writers within the process
static WRITE_SEQ: AtomicU64 = AtomicU64::new(0);

const PALETTE: [&str; 10] = [
    "#4c72b0", "#dd8452", "#55a868", "#c44e52", "#8172b3", "#937860", "#da8bc3", "#8c8c8c",
    "#ccb974", "#64b5cd",
];

struct Frame {
    width: f64,
    height: f64,
    left: f64,
    top: f64,
    plot_w: f64,
    plot_h: f64,
}

/// Render `table` as a standalone SVG document
pub fn render_svg(table: &LabeledTable, options: &ChartOptions) -> String {
    let (width, height) = if options.square {
        SQUARE_SIZE
    } else {
        DEFAULT_SIZE
    };
    let horizontal = options.graph_format == GraphFormat::Barh;

    let legend_rows = table.columns.len().div_ceil(LEGEND_COLUMNS);
    let legend_lines: usize = table
        .columns
        .chunks(LEGEND_COLUMNS)
        .map(|pair| pair.iter().map(|c| line_count(&wrap_label(c))).max().unwrap_or(1))
        .sum();
    let legend_h = legend_lines as f64 * LINE_HEIGHT + legend_rows as f64 * 4.0 + 16.0;

    let label_lines = table.index.iter().map(|l| line_count(l)).max().unwrap_or(1);
    let (left, bottom) = if horizontal {
        (130.0, 30.0 + legend_h)
    } else {
        (50.0, 16.0 + label_lines as f64 * LINE_HEIGHT + legend_h)
    };
    let top = 16.0;
    let right = if options.label_bars && horizontal { 48.0 } else { 16.0 };

    let frame = Frame {
        width,
        height,
        left,
        top,
        plot_w: (width - left - right).max(1.0),
        plot_h: (height - top - bottom).max(1.0),
    };

    let max = axis_max(table, options.stacked);

    let mut svg = String::new();
    let _ = writeln!(
        svg,
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="0 0 {w} {h}" font-family="sans-serif" font-size="{fs}">"#,
        w = width,
        h = height,
        fs = FONT_SIZE
    );
    let _ = writeln!(
        svg,
        r#"<rect width="{}" height="{}" fill="white"/>"#,
        width, height
    );

    draw_ticks(&mut svg, &frame, max, horizontal);
    draw_bars(&mut svg, &frame, table, options, max, horizontal);
    draw_categories(&mut svg, &frame, table, horizontal);
    draw_axes(&mut svg, &frame);
    draw_legend(&mut svg, &frame, table, frame.height - legend_h + 8.0);

    svg.push_str("</svg>\n");
    svg
}

fn axis_max(table: &LabeledTable, stacked: bool) -> f64 {
    let max = if stacked {
        table
            .data
            .iter()
            .map(|row| row.iter().filter(|v| **v > 0.0).sum::<f64>())
            .fold(0.0, f64::max)
    } else {
        table.data.iter().flatten().copied().fold(0.0, f64::max)
    };
    if max > 0.0 {
        max
    } else {
        1.0
    }
}

fn draw_ticks(svg: &mut String, f: &Frame, max: f64, horizontal: bool) {
    for i in 0..TICK_COUNT {
        let value = max * i as f64 / (TICK_COUNT - 1) as f64;
        let label = format_tick(value);
        if horizontal {
            let x = f.left + f.plot_w * i as f64 / (TICK_COUNT - 1) as f64;
            let _ = writeln!(
                svg,
                r##"<line x1="{x:.1}" y1="{}" x2="{x:.1}" y2="{:.1}" stroke="#e5e5e5"/>"##,
                f.top,
                f.top + f.plot_h
            );
            let _ = writeln!(
                svg,
                r##"<text x="{x:.1}" y="{:.1}" text-anchor="middle" fill="#444">{}</text>"##,
                f.top + f.plot_h + 14.0,
                label
            );
        } else {
            let y = f.top + f.plot_h - f.plot_h * i as f64 / (TICK_COUNT - 1) as f64;
            let _ = writeln!(
                svg,
                r##"<line x1="{}" y1="{y:.1}" x2="{:.1}" y2="{y:.1}" stroke="#e5e5e5"/>"##,
                f.left,
                f.left + f.plot_w
            );
            let _ = writeln!(
                svg,
                r##"<text x="{:.1}" y="{:.1}" text-anchor="end" fill="#444">{}</text>"##,
                f.left - 4.0,
                y + 4.0,
                label
            );
        }
    }
}

fn draw_bars(
    svg: &mut String,
    f: &Frame,
    table: &LabeledTable,
    options: &ChartOptions,
    max: f64,
    horizontal: bool,
) {
    let rows = table.index.len().max(1);
    let series = table.columns.len().max(1);
    let band = (if horizontal { f.plot_h } else { f.plot_w }) / rows as f64;
    let group = band
        * if options.stacked {
            STACKED_BAR_WIDTH
        } else {
            BAR_WIDTH
        };
    let thickness = if options.stacked {
        group
    } else {
        group / series as f64
    };
    let extent = if horizontal { f.plot_w } else { f.plot_h };

    for (r, row) in table.data.iter().enumerate() {
        let group_start = band * r as f64 + (band - group) / 2.0;
        let mut offset = 0.0;

        for (c, value) in row.iter().enumerate() {
            let value = value.max(0.0);
            let length = value / max * extent;
            let across = if options.stacked {
                group_start
            } else {
                group_start + thickness * c as f64
            };
            let colour = PALETTE[c % PALETTE.len()];

            let (x, y, w, h) = if horizontal {
                (f.left + offset, f.top + across, length, thickness)
            } else {
                (
                    f.left + across,
                    f.top + f.plot_h - offset - length,
                    thickness,
                    length,
                )
            };
            let _ = writeln!(
                svg,
                r#"<rect x="{x:.2}" y="{y:.2}" width="{w:.2}" height="{h:.2}" fill="{colour}"/>"#
            );

            if options.label_bars && horizontal {
                let _ = writeln!(
                    svg,
                    r##"<text class="bar-label" x="{:.2}" y="{:.2}" font-size="7" dominant-baseline="middle" fill="#222">{}</text>"##,
                    x + w + 2.0,
                    y + h / 2.0,
                    format_bar_label(value, options.label_int)
                );
            }

            if options.stacked {
                offset += length;
            }
        }
    }
}

fn draw_categories(svg: &mut String, f: &Frame, table: &LabeledTable, horizontal: bool) {
    let rows = table.index.len().max(1);
    let band = (if horizontal { f.plot_h } else { f.plot_w }) / rows as f64;

    for (r, label) in table.index.iter().enumerate() {
        let centre = band * r as f64 + band / 2.0;
        if horizontal {
            let lines = line_count(label) as f64;
            let y = f.top + centre - (lines - 1.0) * LINE_HEIGHT / 2.0 + 4.0;
            multiline_text(svg, f.left - 6.0, y, "end", label);
        } else {
            multiline_text(svg, f.left + centre, f.top + f.plot_h + 14.0, "middle", label);
        }
    }
}

fn draw_axes(svg: &mut String, f: &Frame) {
    let _ = writeln!(
        svg,
        r##"<rect x="{}" y="{}" width="{:.1}" height="{:.1}" fill="none" stroke="#444"/>"##,
        f.left, f.top, f.plot_w, f.plot_h
    );
}

fn draw_legend(svg: &mut String, f: &Frame, table: &LabeledTable, top: f64) {
    let column_w = f.width / (LEGEND_COLUMNS as f64 + 1.0);
    let start_x = (f.width - column_w * LEGEND_COLUMNS as f64) / 2.0;
    let mut y = top;

    for (pair_index, pair) in table.columns.chunks(LEGEND_COLUMNS).enumerate() {
        let mut tallest = 1;
        for (i, column) in pair.iter().enumerate() {
            let series = pair_index * LEGEND_COLUMNS + i;
            let label = wrap_label(column);
            let x = start_x + column_w * i as f64;
            let _ = writeln!(
                svg,
                r#"<rect x="{x:.1}" y="{:.1}" width="10" height="10" fill="{}"/>"#,
                y - 9.0,
                PALETTE[series % PALETTE.len()]
            );
            multiline_text(svg, x + 14.0, y, "start", &label);
            tallest = tallest.max(line_count(&label));
        }
        y += tallest as f64 * LINE_HEIGHT + 4.0;
    }
}

fn multiline_text(svg: &mut String, x: f64, y: f64, anchor: &str, text: &str) {
    let _ = write!(
        svg,
        r##"<text x="{x:.1}" y="{y:.1}" text-anchor="{anchor}" fill="#222">"##
    );
    for (i, line) in text.split('\n').enumerate() {
        let dy = if i == 0 { 0.0 } else { LINE_HEIGHT };
        let _ = write!(
            svg,
            r#"<tspan x="{x:.1}" dy="{dy}">{}</tspan>"#,
            xml_escape(line)
        );
    }
    svg.push_str("</text>\n");
}

fn line_count(text: &str) -> usize {
    text.split('\n').count()
}

fn format_tick(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{}", value as i64)
    } else {
        format!("{:.1}", value)
    }
}

fn format_bar_label(value: f64, as_int: bool) -> String {
    if as_int {
        format!("{}", value.round() as i64)
    } else {
        format!("{:.1}", value)
    }
}

fn xml_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

/// Rendered charts on disk, addressed by request hash
#[derive(Debug, Clone)]
pub struct ImageStore {
    dir: PathBuf,
    url_prefix: String,
}

impl ImageStore {
    /// `url_prefix` is normalized to a single leading slash; the root path
    /// is not a valid prefix and falls back to `/images`
    pub fn new(dir: impl Into<PathBuf>, url_prefix: impl Into<String>) -> Self {
        let trimmed = url_prefix.into().trim_matches('/').to_string();
        let url_prefix = if trimmed.is_empty() {
            "/images".to_string()
        } else {
            format!("/{}", trimmed)
        };
        Self {
            dir: dir.into(),
            url_prefix,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn url_prefix(&self) -> &str {
        &self.url_prefix
    }

    pub fn file_name(hash: &str, image_type: ImageType) -> String {
        format!("{}.{}", hash, image_type.extension())
    }

    pub fn path_for(&self, hash: &str, image_type: ImageType) -> PathBuf {
        self.dir.join(Self::file_name(hash, image_type))
    }

    pub fn url_for(&self, hash: &str, image_type: ImageType) -> String {
        format!("{}/{}", self.url_prefix, Self::file_name(hash, image_type))
    }

    pub async fn exists(&self, hash: &str, image_type: ImageType) -> bool {
        tokio::fs::try_exists(self.path_for(hash, image_type))
            .await
            .unwrap_or(false)
    }

    /// Write a rendered chart; readers never see a partial file
    pub async fn write(&self, hash: &str, image_type: ImageType, contents: &[u8]) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let path = self.path_for(hash, image_type);
        let seq = WRITE_SEQ.fetch_add(1, Ordering::Relaxed);
        let tmp = self.dir.join(format!(
            ".{}.{}.{}.tmp",
            Self::file_name(hash, image_type),
            std::process::id(),
            seq
        ));
        tokio::fs::write(&tmp, contents).await?;
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }

        debug!(path = %path.display(), bytes = contents.len(), "Chart written");
        Ok(path)
    }

    /// Delete every file in the image directory
    ///
    /// A missing directory counts as already purged.
    pub async fn purge(&self) -> Result<u64> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        let mut removed = 0;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file() {
                tokio::fs::remove_file(entry.path()).await?;
                removed += 1;
            }
        }

        info!(dir = %self.dir.display(), removed, "Image cache purged");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn table() -> LabeledTable {
        LabeledTable {
            index: vec!["first row".to_string(), "second\nrow".to_string()],
            columns: vec!["a".to_string(), "b & c".to_string(), "d".to_string()],
            data: vec![vec![5.0, 3.0, 0.0], vec![1.0, 2.5, 4.0]],
        }
    }

    #[test]
    fn test_render_grouped_horizontal() {
        let svg = render_svg(&table(), &ChartOptions::default());

        assert!(svg.starts_with("<svg"));
        assert!(svg.trim_end().ends_with("</svg>"));
        assert!(svg.contains(r#"width="800""#));
        // One rect per cell, plus legend swatches
        assert_eq!(svg.matches(r##"fill="#4c72b0""##).count(), 3);
        assert!(svg.contains("b &amp; c"));
        assert!(!svg.contains("b & c"));
        // Wrapped row label becomes two tspans
        assert!(svg.contains(">second</tspan>"));
        assert!(svg.contains(">row</tspan>"));
    }

    #[test]
    fn test_render_square() {
        let options = ChartOptions {
            square: true,
            graph_format: GraphFormat::Bar,
            ..Default::default()
        };
        let svg = render_svg(&table(), &options);
        assert!(svg.contains(r#"width="400" height="400""#));
    }

    fn bar_labels(svg: &str) -> Vec<String> {
        svg.lines()
            .filter(|line| line.contains(r#"class="bar-label""#))
            .filter_map(|line| {
                let start = line.find('>')? + 1;
                let end = line.find("</text>")?;
                Some(line[start..end].to_string())
            })
            .collect()
    }

    #[test]
    fn test_bar_labels_only_for_horizontal() {
        let mut options = ChartOptions {
            label_bars: true,
            ..Default::default()
        };
        let svg = render_svg(&table(), &options);
        assert_eq!(
            bar_labels(&svg),
            vec!["5.0", "3.0", "0.0", "1.0", "2.5", "4.0"]
        );

        options.label_int = true;
        let svg = render_svg(&table(), &options);
        assert_eq!(bar_labels(&svg), vec!["5", "3", "0", "1", "3", "4"]);

        options.graph_format = GraphFormat::Bar;
        let svg = render_svg(&table(), &options);
        assert!(bar_labels(&svg).is_empty());
    }

    #[test]
    fn test_stacked_axis_uses_row_sums() {
        assert_eq!(axis_max(&table(), false), 5.0);
        assert_eq!(axis_max(&table(), true), 8.0);

        let empty = LabeledTable {
            index: vec![],
            columns: vec![],
            data: vec![],
        };
        assert_eq!(axis_max(&empty, true), 1.0);
        assert!(render_svg(&empty, &ChartOptions::default()).contains("</svg>"));
    }

    #[test]
    fn test_xml_escape() {
        assert_eq!(xml_escape(r#"<a href="x">'&'</a>"#), "&lt;a href=&quot;x&quot;&gt;&#39;&amp;&#39;&lt;/a&gt;");
    }

    #[tokio::test]
    async fn test_image_store_write_and_purge() {
        let temp = TempDir::new().unwrap();
        let store = ImageStore::new(temp.path().join("images"), "/images/");

        assert_eq!(store.url_for("abc", ImageType::Svg), "/images/abc.svg");
        assert_eq!(ImageStore::new("x", "charts").url_prefix(), "/charts");
        assert_eq!(ImageStore::new("x", "/").url_prefix(), "/images");
        assert!(!store.exists("abc", ImageType::Svg).await);

        // Purging before the directory exists is a no-op
        assert_eq!(store.purge().await.unwrap(), 0);

        let path = store.write("abc", ImageType::Svg, b"<svg/>").await.unwrap();
        assert_eq!(path, temp.path().join("images").join("abc.svg"));
        assert!(store.exists("abc", ImageType::Svg).await);
        store.write("def", ImageType::Svg, b"<svg/>").await.unwrap();

        assert_eq!(store.purge().await.unwrap(), 2);
        assert!(!store.exists("abc", ImageType::Svg).await);
        assert_eq!(store.purge().await.unwrap(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_writes_of_one_chart_all_succeed() {
        let temp = TempDir::new().unwrap();
        let store = ImageStore::new(temp.path().join("images"), "/images");
        let contents = vec![b'x'; 200 * 1024];

        for _ in 0..20 {
            let mut handles = Vec::new();
            for _ in 0..8 {
                let store = store.clone();
                let contents = contents.clone();
                handles.push(tokio::spawn(async move {
                    store.write("h", ImageType::Svg, &contents).await
                }));
            }
            for handle in handles {
                handle.await.unwrap().unwrap();
            }
        }

        // Only the finished chart remains, no temp files
        let names: Vec<_> = std::fs::read_dir(store.dir())
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("h.svg")]);
        assert_eq!(
            std::fs::read(store.path_for("h", ImageType::Svg)).unwrap().len(),
            200 * 1024
        );
    }
}
