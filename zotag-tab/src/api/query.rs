//! Query evaluation endpoint
//!
//! `GET /query` evaluates one request and answers in the shape selected by
//! `format`: raw rows as JSON, an HTML table, or a page of cached charts.
//! Without a format the query form is served instead.

use axum::{
    extract::{Query, State},
    response::{Html, IntoResponse, Response},
    Json,
};
use tracing::{debug, info};

use super::ui::{render_form, render_page, render_table_html, revise_link};
use crate::chart::{render_svg, ImageStore};
use crate::error::{ApiError, ApiResult};
use crate::params::{ImageType, OutputFormat, QueryParams, RawQuery};
use crate::table::TableBuilder;
use crate::AppState;

/// GET /query
pub async fn run_query(
    State(state): State<AppState>,
    Query(raw): Query<RawQuery>,
) -> ApiResult<Response> {
    let Some(format) = raw.output_format()? else {
        return Ok(Html(render_form(&raw)).into_response());
    };
    let params = raw.to_params()?;

    info!(
        ?format,
        tags_x = params.tags_x.len(),
        tags_y = params.tags_y.len(),
        filter = params.filter.len(),
        "Evaluating query"
    );

    match format {
        OutputFormat::Json => {
            let data = state.aggregator.tabulate(&params).await?;
            Ok(Json(data).into_response())
        }
        OutputFormat::Table => {
            let data = state.aggregator.tabulate(&params).await?;
            let table = TableBuilder::build(&data, &params);
            let page = render_page(&render_table_html(&table), Some(&revise_link(&raw)));
            Ok(Html(page).into_response())
        }
        OutputFormat::Image => {
            let content = render_charts(&state, &params).await?;
            Ok(Html(render_page(&content, Some(&revise_link(&raw)))).into_response())
        }
    }
}

/// Chart markup for a request, one chart per X tag with `subplots`
async fn render_charts(state: &AppState, params: &QueryParams) -> ApiResult<String> {
    if params.chart.image_type != ImageType::Svg {
        return Err(ApiError::BadRequest(format!(
            "Image type '{}' is not supported; use svg",
            params.chart.image_type.extension()
        )));
    }

    if !params.chart.subplots {
        return chart_markup(state, params).await;
    }

    // Keep every subgraph in X order
    let mut content = String::new();
    for x in &params.tags_x {
        let single = QueryParams {
            tags_x: vec![x.clone()],
            sort: false,
            ..params.clone()
        };
        content.push_str(&chart_markup(state, &single).await?);
    }
    Ok(content)
}

/// Render (or reuse) the chart for `params` and return its `<img>` block
async fn chart_markup(state: &AppState, params: &QueryParams) -> ApiResult<String> {
    let image_type = params.chart.image_type;
    let hash = params.request_hash();

    if state.images.exists(&hash, image_type).await {
        debug!(hash = %hash, "Reusing rendered chart");
    } else {
        let data = state.aggregator.tabulate(params).await?;
        let table = TableBuilder::build(&data, params);
        let svg = render_svg(&table, &params.chart);
        state.images.write(&hash, image_type, svg.as_bytes()).await?;
        info!(hash = %hash, "Chart rendered");
    }

    Ok(img_block(&state.images, &hash, image_type))
}

fn img_block(images: &ImageStore, hash: &str, image_type: ImageType) -> String {
    format!(
        "<div class=\"chart\"><img src=\"{}\" id=\"{}\"/></div>\n",
        images.url_for(hash, image_type),
        hash
    )
}
