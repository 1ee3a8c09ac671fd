use nova_act_interpreter::{ActuatorError, BrowserObservation};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

const AGENT_CONFIG_NAME: &str = "plan-v2";
const PLANNER_FUNCTION_NAME: &str = "act";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PlanRequest<'a> {
    agent_run_id: &'a str,
    id_to_bbox_map: &'a BTreeMap<String, Value>,
    observation: &'a BrowserObservation,
    screenshot_base64: &'a str,
    temp_return_plan_response: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_executing_previous_step: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    agent_run_create: Option<AgentRunCreate<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AgentRunCreate<'a> {
    agent_config_name: &'static str,
    id: &'a str,
    planner_function_args: PlannerFunctionArgs<'a>,
    planner_function_name: &'static str,
    planning_model_server_host: &'a str,
    task: &'a str,
}

#[derive(Debug, Serialize)]
struct PlannerFunctionArgs<'a> {
    task: &'a str,
}

/// JSON-encoded plan request for one step.
///
/// The task prompt only travels with the first step. A redirect from the
/// previous step is passed back as `"<ErrorKind>: <message>"`.
pub fn construct_plan_request(
    act_id: &str,
    observation: &BrowserObservation,
    prompt: &str,
    error_executing_previous_step: Option<&ActuatorError>,
    is_initial_step: bool,
    endpoint_name: &str,
) -> Result<String, serde_json::Error> {
    let agent_run_create = is_initial_step.then_some(AgentRunCreate {
        agent_config_name: AGENT_CONFIG_NAME,
        id: act_id,
        planner_function_args: PlannerFunctionArgs { task: prompt },
        planner_function_name: PLANNER_FUNCTION_NAME,
        planning_model_server_host: endpoint_name,
        task: prompt,
    });

    let request = PlanRequest {
        agent_run_id: act_id,
        id_to_bbox_map: &observation.id_to_bbox_map,
        observation,
        screenshot_base64: &observation.screenshot_base64,
        temp_return_plan_response: true,
        error_executing_previous_step: error_executing_previous_step.map(ActuatorError::describe),
        agent_run_create,
    };
    serde_json::to_string(&request)
}
