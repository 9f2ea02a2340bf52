//! Cooperative processes and semaphores.
//!
//! Ready and waiting queues are chains of `Link` objects in the heap, so
//! the collector sees every queued process through the Processor.
//! Switches are only requested here; the dispatch loop performs them at
//! its next housekeeping point.

use std::collections::VecDeque;
use std::time::Instant;

use object::layout::*;
use object::{Space, Value};

use crate::{Interpreter, RuntimeError};

pub(crate) struct Scheduler {
    /// A context switch happens at the next housekeeping point.
    pub switch_pending: bool,
    last_switch: Instant,
    last_timer: Instant,
    /// Events drained from the input feed, not yet consumed.
    pub pending_input: VecDeque<i64>,
    pub switches: u64,
}

impl Scheduler {
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            switch_pending: false,
            last_switch: now,
            last_timer: now,
            pending_input: VecDeque::new(),
            switches: 0,
        }
    }

    /// Start timing a process that was made active outside a switch.
    pub fn mark_running(&mut self) {
        self.last_switch = Instant::now();
    }
}

/// Which two fields of an owner hold the head and tail of a queue.
#[derive(Debug, Clone, Copy)]
struct Queue {
    first: usize,
    last: usize,
}

const READY: Queue = Queue {
    first: PROCESSOR_FIRST,
    last: PROCESSOR_LAST,
};

const WAITING: Queue = Queue {
    first: SEMAPHORE_FIRST,
    last: SEMAPHORE_LAST,
};

impl Interpreter {
    // ── Queues ─────────────────────────────────────────────────────

    fn new_link(&mut self, value: Value, next: Value) -> Result<Value, RuntimeError> {
        let nil = self.special.nil;
        let link = self
            .heap
            .allocate_fields(Space::Ephemeral, self.special.link, LINK_SIZE, nil)?;
        self.heap.store_field(link, LINK_VALUE, value)?;
        self.heap.store_field(link, LINK_NEXT, next)?;
        Ok(link)
    }

    fn push_back(&mut self, owner: Value, queue: Queue, value: Value) -> Result<(), RuntimeError> {
        let nil = self.special.nil;
        let link = self.new_link(value, nil)?;
        let last = self.heap.fetch_field(owner, queue.last)?;
        if last == nil {
            self.heap.store_field(owner, queue.first, link)?;
        } else {
            self.heap.store_field(last, LINK_NEXT, link)?;
        }
        self.heap.store_field(owner, queue.last, link)?;
        Ok(())
    }

    fn push_front(&mut self, owner: Value, queue: Queue, value: Value) -> Result<(), RuntimeError> {
        let first = self.heap.fetch_field(owner, queue.first)?;
        let link = self.new_link(value, first)?;
        self.heap.store_field(owner, queue.first, link)?;
        if first == self.special.nil {
            self.heap.store_field(owner, queue.last, link)?;
        }
        Ok(())
    }

    fn pop_front(&mut self, owner: Value, queue: Queue) -> Result<Option<Value>, RuntimeError> {
        let nil = self.special.nil;
        let first = self.heap.fetch_field(owner, queue.first)?;
        if first == nil {
            return Ok(None);
        }
        let value = self.heap.fetch_field(first, LINK_VALUE)?;
        let next = self.heap.fetch_field(first, LINK_NEXT)?;
        self.heap.store_field(owner, queue.first, next)?;
        if next == nil {
            self.heap.store_field(owner, queue.last, nil)?;
        }
        Ok(Some(value))
    }

    /// Remove the first link holding `value`. Answers whether one was
    /// found.
    fn unlink(&mut self, owner: Value, queue: Queue, value: Value) -> Result<bool, RuntimeError> {
        let nil = self.special.nil;
        let mut previous = nil;
        let mut link = self.heap.fetch_field(owner, queue.first)?;
        while link != nil {
            let next = self.heap.fetch_field(link, LINK_NEXT)?;
            if self.heap.fetch_field(link, LINK_VALUE)? == value {
                if previous == nil {
                    self.heap.store_field(owner, queue.first, next)?;
                } else {
                    self.heap.store_field(previous, LINK_NEXT, next)?;
                }
                if next == nil {
                    self.heap.store_field(owner, queue.last, previous)?;
                }
                return Ok(true);
            }
            previous = link;
            link = next;
        }
        Ok(false)
    }

    /// Processes in the ready queue, front first.
    pub fn ready_processes(&self) -> Result<Vec<Value>, RuntimeError> {
        self.queued(self.special.processor, READY)
    }

    /// Processes blocked on `semaphore`, front first.
    pub fn waiting_processes(&self, semaphore: Value) -> Result<Vec<Value>, RuntimeError> {
        self.queued(semaphore, WAITING)
    }

    fn queued(&self, owner: Value, queue: Queue) -> Result<Vec<Value>, RuntimeError> {
        let nil = self.special.nil;
        let mut out = Vec::new();
        let mut link = self.heap.fetch_field(owner, queue.first)?;
        while link != nil {
            out.push(self.heap.fetch_field(link, LINK_VALUE)?);
            link = self.heap.fetch_field(link, LINK_NEXT)?;
        }
        Ok(out)
    }

    pub fn active_process(&self) -> Result<Value, RuntimeError> {
        Ok(self.heap.fetch_field(self.special.processor, PROCESSOR_ACTIVE)?)
    }

    // ── Transitions ────────────────────────────────────────────────

    /// Put the running process at the back of the ready queue unless it
    /// is already leaving the processor.
    fn requeue_active(&mut self) -> Result<(), RuntimeError> {
        let active = self.active_process()?;
        if active != self.special.nil && !self.scheduler.switch_pending {
            self.push_back(self.special.processor, READY, active)?;
        }
        Ok(())
    }

    pub(crate) fn signal_semaphore(&mut self, semaphore: Value) -> Result<(), RuntimeError> {
        match self.pop_front(semaphore, WAITING)? {
            Some(waiter) => {
                log::trace!("signal wakes {waiter:?}");
                if waiter == self.regs.entry_process {
                    self.regs.entry_wait = self.special.nil;
                }
                self.push_front(self.special.processor, READY, waiter)?;
                self.requeue_active()?;
                self.scheduler.switch_pending = true;
            }
            None => {
                let excess = self.excess_signals(semaphore)?;
                self.heap
                    .store_field(semaphore, SEMAPHORE_EXCESS, Value::from_i64(excess + 1))?;
            }
        }
        Ok(())
    }

    pub(crate) fn wait_semaphore(&mut self, semaphore: Value) -> Result<(), RuntimeError> {
        let excess = self.excess_signals(semaphore)?;
        if excess > 0 {
            self.heap
                .store_field(semaphore, SEMAPHORE_EXCESS, Value::from_i64(excess - 1))?;
            return Ok(());
        }
        let active = self.active_process()?;
        log::trace!("{active:?} waits");
        self.push_back(semaphore, WAITING, active)?;
        if active == self.regs.entry_process {
            self.regs.entry_wait = semaphore;
        }
        self.scheduler.switch_pending = true;
        Ok(())
    }

    fn excess_signals(&self, semaphore: Value) -> Result<i64, RuntimeError> {
        let excess = self.heap.fetch_field(semaphore, SEMAPHORE_EXCESS)?;
        if excess == self.special.nil {
            return Ok(0);
        }
        Ok(excess.as_small_int()?)
    }

    /// Let every ready process run before the active one continues.
    pub(crate) fn yield_processor(&mut self) -> Result<(), RuntimeError> {
        let first = self.heap.fetch_field(self.special.processor, PROCESSOR_FIRST)?;
        if first == self.special.nil {
            return Ok(());
        }
        self.requeue_active()?;
        self.scheduler.switch_pending = true;
        Ok(())
    }

    /// Queue a new process running `context`. It runs before the forker
    /// resumes.
    pub(crate) fn fork_process(&mut self, context: Value) -> Result<Value, RuntimeError> {
        let nil = self.special.nil;
        let process = self
            .heap
            .allocate_fields(Space::Ephemeral, self.special.process, PROCESS_SIZE, nil)?;
        self.heap.store_field(process, PROCESS_CONTEXT, context)?;
        self.heap
            .store_field(process, PROCESS_TIME, Value::from_i64(0))?;
        self.push_back(self.special.processor, READY, process)?;
        self.requeue_active()?;
        self.scheduler.switch_pending = true;
        log::trace!("forked {process:?}");
        Ok(process)
    }

    /// Take the entry process off any queue an aborted run left it on,
    /// so a new run starts it exactly once.
    pub(crate) fn detach_entry_process(&mut self) -> Result<(), RuntimeError> {
        let nil = self.special.nil;
        let entry = self.regs.entry_process;
        if self.unlink(self.special.processor, READY, entry)? {
            log::debug!("entry process removed from the ready queue");
        }
        let semaphore = self.regs.entry_wait;
        if semaphore != nil {
            self.unlink(semaphore, WAITING, entry)?;
            self.regs.entry_wait = nil;
            log::debug!("entry process removed from {semaphore:?}");
        }
        Ok(())
    }

    /// The bottom context of the active process returned `value`.
    pub(crate) fn process_finished(&mut self, value: Value) -> Result<(), RuntimeError> {
        let nil = self.special.nil;
        let active = self.active_process()?;
        if active != nil {
            self.heap.store_field(active, PROCESS_CONTEXT, nil)?;
        }
        self.clear_registers();
        if active == self.regs.entry_process {
            self.regs.result = Some(value);
        } else {
            log::trace!("{active:?} terminated");
            self.heap
                .store_field(self.special.processor, PROCESSOR_ACTIVE, nil)?;
            self.scheduler.switch_pending = true;
        }
        Ok(())
    }

    // ── Housekeeping ───────────────────────────────────────────────

    /// Service the timer and the input feed, then perform any pending
    /// switch.
    pub(crate) fn housekeeping(&mut self) -> Result<(), RuntimeError> {
        self.poll_events()?;
        if self.scheduler.switch_pending {
            self.context_switch()?;
        }
        Ok(())
    }

    fn poll_events(&mut self) -> Result<(), RuntimeError> {
        let irq = self
            .heap
            .fetch_field(self.special.processor, PROCESSOR_IRQ_TABLE)?;
        if self.scheduler.last_timer.elapsed() >= self.settings.timer_interval {
            self.scheduler.last_timer = Instant::now();
            let timer = self.heap.fetch_field(irq, IRQ_TIMER)?;
            self.signal_semaphore(timer)?;
        }
        let events = self.input.drain();
        if !events.is_empty() {
            let input = self.heap.fetch_field(irq, IRQ_INPUT)?;
            for event in events {
                self.scheduler.pending_input.push_back(event);
                self.signal_semaphore(input)?;
            }
        }
        Ok(())
    }

    /// Save the outgoing process and resume the front of the ready queue,
    /// idling until one is ready.
    fn context_switch(&mut self) -> Result<(), RuntimeError> {
        let nil = self.special.nil;
        let processor = self.special.processor;
        self.flush()?;

        let outgoing = self.active_process()?;
        if outgoing != nil {
            let elapsed = self.scheduler.last_switch.elapsed().as_micros() as i64;
            let time = self.heap.fetch_field(outgoing, PROCESS_TIME)?;
            let total = time.small_int().unwrap_or(0).saturating_add(elapsed);
            self.heap
                .store_field(outgoing, PROCESS_TIME, Value::try_from_i64(total)?)?;
            self.heap
                .store_field(outgoing, PROCESS_CONTEXT, self.regs.active_context)?;
        }
        self.heap.store_field(processor, PROCESSOR_ACTIVE, nil)?;
        self.clear_registers();

        let idle_since = Instant::now();
        let (incoming, context) = loop {
            if let Some(process) = self.pop_front(processor, READY)? {
                let context = self.heap.fetch_field(process, PROCESS_CONTEXT)?;
                if context != nil {
                    break (process, context);
                }
                continue;
            }
            if let Some(limit) = self.settings.idle_limit
                && idle_since.elapsed() >= limit
            {
                log::warn!("no runnable process after {:?}", idle_since.elapsed());
                return Err(RuntimeError::Deadlock);
            }
            std::thread::sleep(self.settings.idle_sleep);
            self.poll_events()?;
        };

        self.heap.store_field(processor, PROCESSOR_ACTIVE, incoming)?;
        self.reload(context)?;
        self.scheduler.switch_pending = false;
        self.scheduler.switches += 1;
        self.scheduler.mark_running();
        log::trace!("switch {outgoing:?} -> {incoming:?}");
        Ok(())
    }

    /// Next drained input event, oldest first.
    pub(crate) fn next_input_event(&mut self) -> Option<i64> {
        self.scheduler.pending_input.pop_front()
    }

    /// Context switches performed so far.
    pub fn context_switches(&self) -> u64 {
        self.scheduler.switches
    }
}

#[cfg(test)]
mod tests {
    use bytecode::BytecodeBuilder;
    use object::MethodHeader;

    use super::*;
    use crate::{MethodSpec, VMCreateInfo};

    fn new_context(vm: &mut Interpreter) -> Value {
        let mut code = BytecodeBuilder::new();
        code.push_nil();
        code.return_top();
        let spec = MethodSpec::new("run", MethodHeader::bytecodes(0, 0), code.into_bytes());
        let method = vm.compile_method(&spec).unwrap();
        let nil = vm.nil();
        vm.entry_context(method, nil, &[]).unwrap()
    }

    #[test]
    fn forking_saves_the_forker_where_it_stopped() {
        let mut vm = Interpreter::new(VMCreateInfo::default()).unwrap();
        let entry = vm.regs.entry_process;
        let forker_context = new_context(&mut vm);
        vm.heap
            .store_field(vm.special.processor, PROCESSOR_ACTIVE, entry)
            .unwrap();
        vm.reload(forker_context).unwrap();
        vm.push(Value::from_i64(1)).unwrap();
        vm.regs.ip = 1;
        let (ip, sp) = (vm.regs.ip, vm.regs.sp);

        let child_context = new_context(&mut vm);
        let child = vm.fork_process(child_context).unwrap();
        assert_eq!(vm.ready_processes().unwrap(), vec![child, entry]);

        vm.housekeeping().unwrap();
        assert_eq!(vm.active_process().unwrap(), child);
        assert_eq!(vm.regs.active_context, child_context);
        assert_eq!(vm.ready_processes().unwrap(), vec![entry]);

        let saved = vm.heap.fetch_field(entry, PROCESS_CONTEXT).unwrap();
        assert_eq!(saved, forker_context);
        assert_eq!(vm.heap.fetch_field(saved, CONTEXT_IP).unwrap(), Value::from_usize(ip));
        assert_eq!(vm.heap.fetch_field(saved, CONTEXT_SP).unwrap(), Value::from_usize(sp));
    }

    #[test]
    fn unlinking_keeps_the_queue_consistent() {
        let mut vm = Interpreter::new(VMCreateInfo::default()).unwrap();
        let processor = vm.special.processor;
        let [a, b, c, d] = [1, 2, 3, 4].map(Value::from_i64);
        for v in [a, b, c] {
            vm.push_back(processor, READY, v).unwrap();
        }
        assert!(vm.unlink(processor, READY, b).unwrap());
        assert!(vm.unlink(processor, READY, c).unwrap());
        assert!(!vm.unlink(processor, READY, c).unwrap());
        vm.push_back(processor, READY, d).unwrap();
        assert_eq!(vm.ready_processes().unwrap(), vec![a, d]);

        assert!(vm.unlink(processor, READY, a).unwrap());
        assert!(vm.unlink(processor, READY, d).unwrap());
        assert_eq!(vm.ready_processes().unwrap(), vec![]);
        assert_eq!(vm.heap.fetch_field(processor, PROCESSOR_LAST).unwrap(), vm.nil());
    }
}
