//! Statistics document parsing.

use serde::Deserialize;

use crate::{StatsError, StreamSample};

/// Textual values nginx-rtmp variants use to mark an active publisher.
const PUBLISHING_MARKERS: [&str; 4] = ["active", "1", "true", "on"];

#[derive(Debug, Default, Deserialize)]
struct StatsDocument {
    #[serde(default)]
    server: Vec<ServerNode>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerNode {
    #[serde(default)]
    application: Vec<ApplicationNode>,
}

#[derive(Debug, Default, Deserialize)]
struct ApplicationNode {
    #[serde(default)]
    name: String,
    live: Option<LiveNode>,
    // Some stat templates place streams directly under the application.
    #[serde(default)]
    stream: Vec<StreamNode>,
}

impl ApplicationNode {
    fn streams(&self) -> impl Iterator<Item = &StreamNode> {
        self.live
            .iter()
            .flat_map(|live| live.stream.iter())
            .chain(self.stream.iter())
    }
}

#[derive(Debug, Default, Deserialize)]
struct LiveNode {
    #[serde(default)]
    stream: Vec<StreamNode>,
}

#[derive(Debug, Default, Deserialize)]
struct StreamNode {
    #[serde(default)]
    name: String,
    publishing: Option<String>,
    bw_video: Option<String>,
    nclients: Option<String>,
    #[serde(default)]
    client: Vec<ClientNode>,
}

#[derive(Debug, Default, Deserialize)]
#[allow(dead_code)]
struct ClientNode {
    address: Option<String>,
    publishing: Option<String>,
}

/// Parse the statistics document and extract a sample for `stream_name`
/// inside `app_name`.
///
/// An absent application or stream yields `exists = false` with all other
/// fields zero; only a document that fails to parse at all is an error.
pub fn parse_stats(
    xml: &str,
    app_name: &str,
    stream_name: &str,
) -> Result<StreamSample, StatsError> {
    let doc: StatsDocument =
        quick_xml::de::from_str(xml).map_err(|e| StatsError::Malformed(e.to_string()))?;

    for server in &doc.server {
        for app in &server.application {
            if app.name != app_name {
                continue;
            }
            for stream in app.streams() {
                if stream.name != stream_name {
                    continue;
                }
                return Ok(sample_from_stream(stream));
            }
        }
    }

    Ok(StreamSample::absent())
}

fn sample_from_stream(stream: &StreamNode) -> StreamSample {
    let bw_video = parse_numeric(stream.bw_video.as_deref());
    let nclients = match stream.nclients.as_deref() {
        Some(text) => parse_numeric(Some(text)) as u32,
        // Older stat modules omit <nclients>; fall back to counting the
        // per-client records.
        None => stream.client.len() as u32,
    };

    let marked_active = stream
        .publishing
        .as_deref()
        .map(|text| {
            let text = text.trim().to_ascii_lowercase();
            PUBLISHING_MARKERS.contains(&text.as_str())
        })
        .unwrap_or(false);
    let has_publisher_client = stream.client.iter().any(|c| c.publishing.is_some());

    StreamSample {
        exists: true,
        publishing: marked_active || has_publisher_client || nclients >= 1,
        video_bw_bps: bw_video,
        client_count: nclients,
    }
}

fn parse_numeric(text: Option<&str>) -> u64 {
    text.and_then(|t| t.trim().parse::<u64>().ok()).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    const STATS_DOC: &str = r#"<?xml version="1.0" encoding="utf-8" ?>
<rtmp>
    <nginx_version>1.25.3</nginx_version>
    <server>
        <application>
            <name>vod</name>
        </application>
        <application>
            <name>live</name>
            <live>
                <stream>
                    <name>cam</name>
                    <time>51243</time>
                    <bw_video>100000</bw_video>
                    <nclients>2</nclients>
                    <publishing>active</publishing>
                    <client>
                        <address>203.0.113.7</address>
                        <publishing>1</publishing>
                    </client>
                    <client>
                        <address>10.0.0.5</address>
                    </client>
                </stream>
                <stream>
                    <name>backup</name>
                    <bw_video>0</bw_video>
                    <nclients>0</nclients>
                    <publishing></publishing>
                </stream>
            </live>
        </application>
    </server>
</rtmp>"#;

    #[test]
    fn extracts_the_named_stream() {
        let sample = parse_stats(STATS_DOC, "live", "cam").unwrap();
        assert!(sample.exists);
        assert!(sample.publishing);
        assert_eq!(sample.video_bw_bps, 100_000);
        assert_eq!(sample.client_count, 2);
    }

    #[test]
    fn idle_stream_is_not_publishing() {
        let sample = parse_stats(STATS_DOC, "live", "backup").unwrap();
        assert!(sample.exists);
        assert!(!sample.publishing);
        assert_eq!(sample.video_bw_bps, 0);
    }

    #[test]
    fn missing_stream_reports_absent() {
        let sample = parse_stats(STATS_DOC, "live", "nope").unwrap();
        assert_eq!(sample, StreamSample::absent());
    }

    #[test]
    fn missing_application_reports_absent() {
        let sample = parse_stats(STATS_DOC, "ingest", "cam").unwrap();
        assert_eq!(sample, StreamSample::absent());
    }

    #[test]
    fn publishing_markers_are_case_insensitive() {
        for marker in ["Active", "ON", "true", "1"] {
            let xml = format!(
                "<rtmp><server><application><name>live</name><live><stream>\
                 <name>cam</name><publishing>{marker}</publishing>\
                 </stream></live></application></server></rtmp>"
            );
            let sample = parse_stats(&xml, "live", "cam").unwrap();
            assert!(sample.publishing, "marker {marker:?} should publish");
        }
    }

    #[test]
    fn client_presence_implies_publishing() {
        let xml = "<rtmp><server><application><name>live</name><live><stream>\
                   <name>cam</name><nclients>1</nclients>\
                   </stream></live></application></server></rtmp>";
        let sample = parse_stats(xml, "live", "cam").unwrap();
        assert!(sample.publishing);
        assert_eq!(sample.client_count, 1);
    }

    #[test]
    fn unparsable_numerics_default_to_zero() {
        let xml = "<rtmp><server><application><name>live</name><live><stream>\
                   <name>cam</name><bw_video>lots</bw_video><nclients>-3</nclients>\
                   </stream></live></application></server></rtmp>";
        let sample = parse_stats(xml, "live", "cam").unwrap();
        assert!(sample.exists);
        assert_eq!(sample.video_bw_bps, 0);
        assert_eq!(sample.client_count, 0);
    }

    #[test]
    fn streams_directly_under_application_are_found() {
        let xml = "<rtmp><server><application><name>live</name><stream>\
                   <name>cam</name><nclients>1</nclients><bw_video>50000</bw_video>\
                   </stream></application></server></rtmp>";
        let sample = parse_stats(xml, "live", "cam").unwrap();
        assert!(sample.exists);
        assert_eq!(sample.video_bw_bps, 50_000);
    }

    #[test]
    fn malformed_document_is_an_error() {
        let err = parse_stats("<rtmp><server>", "live", "cam").unwrap_err();
        assert!(matches!(err, StatsError::Malformed(_)));
    }
}
