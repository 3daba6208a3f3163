use rust_xlsxwriter::{Color, Format, FormatAlign, Workbook, XlsxError};
use thiserror::Error;
use time::{format_description::BorrowedFormatItem, macros::format_description, OffsetDateTime};
use tracing::info;

use crate::models::message::Message;
use crate::models::plan::EXPORT_ELIGIBLE_PLANS;
use crate::models::subscription::Subscription;

const BRAND_COLOR: u32 = 0x4F46E5;
const MUTED_COLOR: u32 = 0x666666;
const HEADER_ROW: u32 = 3;

const DATE_FORMAT: &[BorrowedFormatItem<'static>] =
    format_description!("[month]/[day]/[year] [hour repr:12]:[minute] [period]");
const EXPORTED_ON_FORMAT: &[BorrowedFormatItem<'static>] =
    format_description!("[month repr:long] [day], [year] at [hour repr:12]:[minute] [period]");
const FILENAME_STAMP: &[BorrowedFormatItem<'static>] =
    format_description!("[year][month][day]_[hour][minute][second]");

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("Failed to create Excel file: {0}")]
    Workbook(#[from] XlsxError),
    #[error("Failed to format date: {0}")]
    Format(#[from] time::error::Format),
}

/// Only current Growth and Pro subscribers may export.
pub fn is_export_eligible(subscription: Option<&Subscription>) -> bool {
    subscription.is_some_and(|s| {
        s.status.is_current() && EXPORT_ELIGIBLE_PLANS.contains(&s.plan_id.as_str())
    })
}

/// `DMify_Messages_<project>_<timestamp>.xlsx` with only safe characters kept.
pub fn export_filename(project_name: &str, now: OffsetDateTime) -> Result<String, ExportError> {
    let safe: String = project_name
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, ' ' | '-' | '_'))
        .collect::<String>()
        .trim()
        .replace(' ', "_");
    Ok(format!(
        "DMify_Messages_{}_{}.xlsx",
        safe,
        now.format(FILENAME_STAMP)?
    ))
}

/// Renders the project's messages as a single-sheet workbook.
pub fn messages_workbook(
    project_name: &str,
    messages: &[Message],
    now: OffsetDateTime,
) -> Result<Vec<u8>, ExportError> {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.set_name("Messages")?;

    let centered = Format::new()
        .set_align(FormatAlign::Center)
        .set_align(FormatAlign::VerticalCenter);
    let title = centered
        .clone()
        .set_bold()
        .set_font_size(14)
        .set_font_color(Color::RGB(BRAND_COLOR));
    let muted = centered
        .clone()
        .set_italic()
        .set_font_size(10)
        .set_font_color(Color::RGB(MUTED_COLOR));
    let header = centered
        .clone()
        .set_bold()
        .set_font_size(12)
        .set_font_color(Color::White)
        .set_background_color(Color::RGB(BRAND_COLOR));
    let wrapped = Format::new()
        .set_text_wrap()
        .set_align(FormatAlign::Top);

    sheet.merge_range(
        0,
        0,
        0,
        3,
        &format!("DMify Messages Export - {project_name}"),
        &title,
    )?;
    sheet.merge_range(
        1,
        0,
        1,
        3,
        &format!("Exported on {}", now.format(EXPORTED_ON_FORMAT)?),
        &muted,
    )?;

    for (col, label) in ["Username", "Generated Message", "Created Date", "Character Count"]
        .into_iter()
        .enumerate()
    {
        sheet.write_string_with_format(HEADER_ROW, col as u16, label, &header)?;
    }

    let mut row = HEADER_ROW + 1;
    for message in messages {
        sheet.write_string_with_format(row, 0, format!("@{}", message.username), &centered)?;
        sheet.write_string_with_format(row, 1, &message.generated_message, &wrapped)?;
        sheet.write_string_with_format(row, 2, message.created_at.format(DATE_FORMAT)?, &centered)?;
        sheet.write_number_with_format(
            row,
            3,
            message.generated_message.chars().count() as f64,
            &centered,
        )?;
        sheet.set_row_height(row, 60)?;
        row += 1;
    }

    for (col, width) in [(0u16, 20), (1, 80), (2, 20), (3, 15)] {
        sheet.set_column_width(col, width)?;
    }

    if !messages.is_empty() {
        let footer_row = row + 1;
        sheet.merge_range(
            footer_row,
            0,
            footer_row,
            3,
            &format!(
                "Total Messages: {} | Generated by DMify - AI Instagram DM Automation",
                messages.len()
            ),
            &muted,
        )?;
    }

    let bytes = workbook.save_to_buffer()?;
    info!(
        project = %project_name,
        messages = messages.len(),
        "created spreadsheet export"
    );
    Ok(bytes)
}
