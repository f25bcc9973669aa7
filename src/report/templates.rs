//! AsciiDoc templates for every generated view, plus the static assets.
//!
//! Every view template starts with a title line followed by the shared
//! header, which pulls `env.adoc` from the root folder through
//! `env_rel_path`.

macro_rules! adoc_view {
    ($title:literal, $body:literal) => {
        concat!(
            $title,
            "\n",
            "ifndef::env-github[]\n",
            "include::{{ env_rel_path }}/env.adoc[]\n",
            "endif::[]\n",
            $body
        )
    };
}

/// A template with its cache identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Template {
    pub id: &'static str,
    pub source: &'static str,
}

/// Run summary with plays, per-host counts and the recent-activity table.
pub const RUN_README: Template = Template {
    id: "run_readme",
    source: adoc_view!(
        "= {{ title }}",
        r#":toc:

{% if run.finished %}
Finished {{ run.ended_at }}.
{% else %}
Running.
{% endif %}

link:charts.adoc[Charts] | link:timeline.adoc[Timeline]

== Summary

[cols="~,1,1,1,1,1,1,1",autowidth,stripes=hover]
|====
| host | 🟢 ok | 🟠 changed | 🔴 failed | 💀 unreachable | 🔵 skipped | ignored | rescued
{% for row in run.hosts %}
| {{ row.host }} | {{ row.counts.ok }} | {{ row.counts.changed }} | {{ row.counts.failed }} | {{ row.counts.unreachable }} | {{ row.counts.skipped }} | {{ row.counts.ignored_failed }} | {{ row.counts.rescued }}
{% endfor %}
| *all* | {{ run.all.ok }} | {{ run.all.changed }} | {{ run.all.failed }} | {{ run.all.unreachable }} | {{ run.all.skipped }} | {{ run.all.ignored_failed }} | {{ run.all.rescued }}
|====

== Plays

{% for play in run.plays %}
* link:plays/{{ play.file_id }}/README.adoc[{{ play.display }}]{% if play.serial_batch > 0 %} (batch {{ play.serial_batch }}){% endif %}{% if play.open %} ⏳{% endif %}: {{ play.task_count }} tasks, {{ play.counts.ok }} ok, {{ play.counts.changed }} changed, {{ play.counts.failed }} failed
{% endfor %}

== Recent activity

Last {{ run.activity_capacity }} tasks, oldest first.

[cols="~,~,1,1,1,1,1,1,1",autowidth,stripes=hover]
|====
| play | task | ok | changed | failed | unreachable | skipped | ignored | rescued
{% for entry in run.activity %}
| {{ entry.play_name }} | link:plays/{{ entry.play_id }}/{{ entry.task_id }}/README.adoc[{{ entry.task_name }}] | {{ entry.counts.ok }} | {{ entry.counts.changed }} | {{ entry.counts.failed }} | {{ entry.counts.unreachable }} | {{ entry.counts.skipped }} | {{ entry.counts.ignored_failed }} | {{ entry.counts.rescued }}
{% endfor %}
|====
"#
    ),
};

/// Donut charts, one for all hosts and one per host.
pub const CHARTS: Template = Template {
    id: "charts",
    source: adoc_view!(
        "= Charts: {{ title }}",
        r#"
{% for chart in charts %}
== {{ chart.title }}

{% if chart.values %}
[vegalite]
....
{
  "$schema": "https://vega.github.io/schema/vega-lite/v5.json",
  "title": {{ chart.title | tojson }},
  "data": {"values": {{ chart.values | tojson }}},
  "encoding": {
    "theta": {"field": "value", "type": "quantitative", "stack": true},
    "color": {
      "field": "status",
      "type": "nominal",
      "scale": {
        "domain": ["ok", "changed", "failed", "unreachable", "skipped", "ignored_failed", "rescued"],
        "range": ["rgb(39,174,96)", "rgb(241,196,15)", "rgb(231,76,60)", "rgb(52,73,94)", "rgb(41,128,185)", "rgb(142,68,173)", "rgb(155,89,182)"]
      }
    }
  },
  "layer": [
    {"mark": {"type": "arc", "innerRadius": 30, "outerRadius": 80}},
    {"mark": {"type": "text", "radius": 95, "fontSize": 22}, "encoding": {"text": {"field": "value", "type": "quantitative"}}}
  ]
}
....
{% else %}
No results yet.
{% endif %}

{% endfor %}
"#
    ),
};

/// Every host result in completion order.
pub const TIMELINE: Template = Template {
    id: "timeline",
    source: adoc_view!(
        "= Timeline",
        r#"
{% if timeline.omitted > 0 %}
_Latest {{ timeline.entries | length }} results. The {{ timeline.omitted }} earlier ones are listed once the run ends._

{% endif %}
[cols="1,1,~,~,~,1",autowidth,stripes=hover]
|====
| # | | host | task | time |
{% for entry in timeline.entries %}
| {{ entry.seq }} | {{ entry.status | status_glyph }} | {{ entry.host }} | {{ entry.task_name }} | {{ entry.at }} | link:plays/{{ entry.play_id }}/{{ entry.task_id }}/README.adoc[🔍]
{% endfor %}
|====
"#
    ),
};

/// Play summary with its task list.
pub const PLAY_README: Template = Template {
    id: "play_readme",
    source: adoc_view!(
        "= PLAY: {{ play.display }}",
        r#":toc:

[cols="1,~",autowidth]
|====
| serial batch | {{ play.serial_batch }}
| started | {{ play.started_at }}
| ended | {{ play.ended_at or "running" }}
|====

link:charts.adoc[Charts] | link:all.adoc[All results]

== Hosts

[cols="~,1,1,1,1,1,1,1",autowidth,stripes=hover]
|====
| host | ok | changed | failed | unreachable | skipped | ignored | rescued
{% for row in play.hosts %}
| {{ row.host }} | {{ row.counts.ok }} | {{ row.counts.changed }} | {{ row.counts.failed }} | {{ row.counts.unreachable }} | {{ row.counts.skipped }} | {{ row.counts.ignored_failed }} | {{ row.counts.rescued }}
{% endfor %}
| *all* | {{ play.all.ok }} | {{ play.all.changed }} | {{ play.all.failed }} | {{ play.all.unreachable }} | {{ play.all.skipped }} | {{ play.all.ignored_failed }} | {{ play.all.rescued }}
|====

== Tasks

{% for task_id in play.task_ids %}
* link:{{ task_id }}/README.adoc[{{ task_id }}]
{% endfor %}
"#
    ),
};

/// Every task of a play, inlined.
pub const PLAY_ALL: Template = Template {
    id: "play_all",
    source: adoc_view!(
        "= PLAY: {{ play.display }}, all results",
        r#":toc:

{% for task_id in play.task_ids %}
include::{{ task_id }}/README.adoc[leveloffset=1]

{% endfor %}
"#
    ),
};

/// One task with a section per host.
pub const TASK_README: Template = Template {
    id: "task_readme",
    source: adoc_view!(
        "= {{ task.display }}{{ \" (handler)\" if task.is_handler else \"\" }}",
        r#":toc:

[cols="1,~",autowidth]
|====
| play | link:../README.adoc[{{ task.play_name }}]
| action | {{ task.action }}
| tags | {{ task.tags | join(", ") }}
| source | {{ task.source_location or "" }}
| rescue | {{ task.has_rescue }}
| started | {{ task.started_at }}
|====

{% for host in task.hosts %}
== {{ host.status | status_glyph }} {{ host.host }}

{% if host.msg %}
{{ host.msg }}

{% endif %}
{% if host.diff %}
.diff
[,diff]
-------
{{ host.diff }}
-------

{% endif %}
{% if host.has_payload %}
link:{{ host.file_stem }}.json[raw result]
{% endif %}

{% endfor %}
"#
    ),
};

/// Raw per-host payload.
pub const HOST_JSON: Template = Template {
    id: "host_json",
    source: "{{ result | to_nice_json }}\n",
};

/// Every view template, for preloading and checks.
pub const ALL: [Template; 7] = [
    RUN_README, CHARTS, TIMELINE, PLAY_README, PLAY_ALL, TASK_README, HOST_JSON,
];

/// Attributes shared by every document; written once per root folder.
pub const ENV_ADOC: &str = r#":toclevels: 2
:docinfo: shared
:kroki-server-url: https://kroki.io
ifdef::env-vscode[]
:relfilesuffix: .adoc
:source-highlighter: highlight.js
endif::[]
"#;

/// Stylesheet snippet injected through docinfo; written once per root folder.
pub const DOCINFO_HTML: &str = r#"<style>
table.tableblock td.tableblock { vertical-align: middle; }
s { opacity: 0.6; }
</style>
"#;
