use iced::widget::{button, column, container, row, text};
use iced::{Alignment, Element, Font, Length};

use crate::recording::{Artifact, SessionState};
use crate::ui::style::{
    container_style, danger_button_style, error_banner_style, primary_button_style,
    tile_button_style, MonochromeTheme, RECORD_RED,
};
use crate::ui::Message;

/// Render elapsed time as `[HH:]MM:SS`.
///
/// The hour segment is present exactly when the total reaches one hour;
/// minutes and seconds are always zero-padded to two digits.
pub fn format_elapsed(total_secs: u64) -> String {
    let hrs = total_secs / 3600;
    let mins = (total_secs % 3600) / 60;
    let secs = total_secs % 60;

    if hrs > 0 {
        format!("{:02}:{:02}:{:02}", hrs, mins, secs)
    } else {
        format!("{:02}:{:02}", mins, secs)
    }
}

pub struct RecorderView;

impl RecorderView {
    pub fn view(
        theme: &MonochromeTheme,
        countdown: u32,
        elapsed_secs: u64,
        session: Option<SessionState>,
        artifact: Option<&Artifact>,
        error: Option<&str>,
    ) -> Element<'static, Message> {
        let theme = *theme;
        let recording = session.is_some();
        let paused = session == Some(SessionState::Paused);

        let readout: Element<'static, Message> = if countdown > 0 {
            text(countdown.to_string()).size(64).color(theme.accent()).into()
        } else {
            text(format_elapsed(elapsed_secs))
                .size(28)
                .font(Font::MONOSPACE)
                .into()
        };

        let mut controls = row![].spacing(8);

        if !recording && artifact.is_none() && countdown == 0 {
            let style = primary_button_style(&theme);
            controls = controls.push(
                button(text("Start Recording").size(14))
                    .padding([8, 16])
                    .style(move |_t, _s| style)
                    .on_press(Message::StartPressed),
            );
        }

        if recording {
            let pause_style = tile_button_style(&theme);
            let pause_label = if paused { "Resume" } else { "Pause" };
            controls = controls.push(
                button(text(pause_label).size(14))
                    .padding([8, 16])
                    .style(move |_t, _s| pause_style)
                    .on_press(Message::PauseToggled),
            );

            let stop_style = danger_button_style(&theme);
            controls = controls.push(
                button(text("Stop Recording").size(14))
                    .padding([8, 16])
                    .style(move |_t, _s| stop_style)
                    .on_press(Message::StopPressed),
            );
        }

        if artifact.is_some() {
            let save_style = primary_button_style(&theme);
            controls = controls.push(
                button(text("Save Recording").size(14))
                    .padding([8, 16])
                    .style(move |_t, _s| save_style)
                    .on_press(Message::SavePressed),
            );

            let preview_style = tile_button_style(&theme);
            controls = controls.push(
                button(text("Preview").size(14))
                    .padding([8, 16])
                    .style(move |_t, _s| preview_style)
                    .on_press(Message::PreviewPressed),
            );
        }

        let status: Element<'static, Message> = if recording {
            let label = if paused {
                "Recording paused"
            } else {
                "Recording in progress..."
            };
            row![
                text("[REC]").size(12).color(RECORD_RED),
                text(label).size(13).color(theme.muted()),
            ]
            .spacing(6)
            .align_y(Alignment::Center)
            .into()
        } else if countdown > 0 {
            text("Get ready to record...")
                .size(13)
                .color(theme.muted())
                .into()
        } else if let Some(artifact) = artifact {
            text(format!(
                "Recorded {:.1} MB, ready to save",
                artifact.len() as f64 / 1_048_576.0
            ))
            .size(13)
            .color(theme.muted())
            .into()
        } else {
            text("Press Start Recording to begin capturing your screen")
                .size(13)
                .color(theme.muted())
                .into()
        };

        let mut content = column![readout, controls, status]
            .spacing(16)
            .align_x(Alignment::Center)
            .width(Length::Fill);

        if let Some(message) = error {
            let banner_style = error_banner_style(&theme);
            content = content.push(
                container(text(message.to_string()).size(13))
                    .padding([8, 12])
                    .style(move |_| banner_style),
            );
        }

        container(content)
            .width(Length::Fill)
            .height(Length::Fill)
            .padding(24)
            .style(move |_| container_style(&theme))
            .into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_elapsed_pads_minutes_and_seconds() {
        assert_eq!(format_elapsed(0), "00:00");
        assert_eq!(format_elapsed(5), "00:05");
        assert_eq!(format_elapsed(65), "01:05");
    }

    #[test]
    fn test_format_elapsed_omits_hours_below_one_hour() {
        assert_eq!(format_elapsed(3599), "59:59");
    }

    #[test]
    fn test_format_elapsed_includes_hours_from_one_hour() {
        assert_eq!(format_elapsed(3600), "01:00:00");
        assert_eq!(format_elapsed(3661), "01:01:01");
        assert_eq!(format_elapsed(7322), "02:02:02");
    }
}
