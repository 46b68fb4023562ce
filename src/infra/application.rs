//! Application graphs: tasks bound to nodes and data flows routed over links.

use crate::id::EntityId;

/// A unit of compute bound to a node.
#[derive(Debug, Clone, PartialEq)]
pub struct Task {
    pub name: String,
    /// Compute demand in CU, reserved on `node` while placed.
    pub cu: f64,
    pub node: EntityId,
}

/// Data sent from one task to another along a fixed list of links.
#[derive(Debug, Clone, PartialEq)]
pub struct DataFlow {
    pub name: String,
    /// Index of the producing task in [`Application::tasks`].
    pub from_task: usize,
    /// Index of the consuming task in [`Application::tasks`].
    pub to_task: usize,
    /// Bandwidth reserved on every link of the route.
    pub bit_rate: f64,
    /// Links traversed between the two task nodes, in order.
    pub links: Vec<EntityId>,
}

/// An application whose tasks have already been mapped to nodes.
///
/// Choosing the nodes and routes is the caller's business; the registry only
/// reserves the capacity and uses the resulting paths for pause cascades.
#[derive(Debug, Clone, PartialEq)]
pub struct Application {
    pub name: String,
    pub tasks: Vec<Task>,
    pub flows: Vec<DataFlow>,
}

impl Application {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tasks: Vec::new(),
            flows: Vec::new(),
        }
    }

    /// Adds a task; its index is the number of tasks added before it.
    pub fn with_task(mut self, name: impl Into<String>, cu: f64, node: EntityId) -> Self {
        self.tasks.push(Task {
            name: name.into(),
            cu,
            node,
        });
        self
    }

    /// Adds a data flow between two task indices.
    pub fn with_flow(
        mut self,
        name: impl Into<String>,
        from_task: usize,
        to_task: usize,
        bit_rate: f64,
        links: Vec<EntityId>,
    ) -> Self {
        self.flows.push(DataFlow {
            name: name.into(),
            from_task,
            to_task,
            bit_rate,
            links,
        });
        self
    }

    /// Every entity path through the application.
    ///
    /// A flow contributes `[source node, links.., destination node]`; a task
    /// that takes part in no flow contributes its node alone.
    pub fn paths(&self) -> Vec<Vec<EntityId>> {
        let mut paths = Vec::with_capacity(self.flows.len() + self.tasks.len());
        let mut in_flow = vec![false; self.tasks.len()];

        for flow in &self.flows {
            let mut path = Vec::with_capacity(flow.links.len() + 2);
            if let Some(task) = self.tasks.get(flow.from_task) {
                path.push(task.node);
                in_flow[flow.from_task] = true;
            }
            path.extend(flow.links.iter().copied());
            if let Some(task) = self.tasks.get(flow.to_task) {
                path.push(task.node);
                in_flow[flow.to_task] = true;
            }
            paths.push(path);
        }

        for (task, used) in self.tasks.iter().zip(in_flow) {
            if !used {
                paths.push(vec![task.node]);
            }
        }
        paths
    }

    /// Whether any task or flow of this application touches `entity`.
    pub fn touches(&self, entity: EntityId) -> bool {
        self.tasks.iter().any(|t| t.node == entity)
            || self.flows.iter().any(|f| f.links.contains(&entity))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::SlotMap;

    #[test]
    fn paths_follow_flows_and_keep_lonely_tasks() {
        let mut ids: SlotMap<EntityId, ()> = SlotMap::with_key();
        let sensor = ids.insert(());
        let fog = ids.insert(());
        let cloud = ids.insert(());
        let wifi = ids.insert(());

        let app = Application::new("camera")
            .with_task("source", 0.0, sensor)
            .with_task("process", 20.0, fog)
            .with_task("archive", 5.0, cloud)
            .with_flow("raw", 0, 1, 100.0, vec![wifi]);

        let paths = app.paths();
        assert_eq!(paths.len(), 2);
        assert_eq!(paths[0], vec![sensor, wifi, fog]);
        assert_eq!(paths[1], vec![cloud]);
        assert!(app.touches(wifi));
    }
}
